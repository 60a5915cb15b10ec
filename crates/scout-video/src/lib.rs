pub mod delay;
pub mod ffmpeg;
pub mod reader;
pub mod ring;
pub mod sink;
pub mod snapshot;
pub mod source;
pub mod writer;

pub use delay::delay_stream;
pub use ffmpeg::FfmpegSource;
pub use reader::{ReaderHandle, VideoReader};
pub use ring::RingBuffer;
pub use sink::{FfmpegSinkFactory, FrameSink, SinkFactory};
pub use snapshot::{save_image, save_preview};
pub use source::VideoSource;
pub use writer::{ActivityKind, VideoWriter, WriterOptions};
