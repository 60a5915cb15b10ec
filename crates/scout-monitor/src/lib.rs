pub mod alert;
pub mod continuous;
pub mod monitor;
pub mod record;
mod render;

pub use alert::{Alert, AlertTimes};
pub use continuous::Continuous;
pub use monitor::Monitor;
pub use record::Record;
