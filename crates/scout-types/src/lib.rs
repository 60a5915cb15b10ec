pub mod color;
pub mod frame;
pub mod processed;
pub mod rect;
pub mod stats;

pub use color::{color_by_name, Highlight, Rgb};
pub use frame::{Frame, PixelBuffer};
pub use processed::{FaceInfo, MotionInfo, ObjectInfo, ProcessedFrame};
pub use rect::Rect;
pub use stats::{FrameStats, FrameStatsCombo, StatsTracker};
