pub mod dir;
pub mod filename;
pub mod pruner;

pub use dir::{bytes_to_gb, expired, list, size_of, FileEntry};
pub use filename::{
    base_filename, image_filename, sort_by_timestamp_name, timestamp_regex, video_filename,
};
pub use pruner::Pruner;
