pub mod manage;
pub mod watcher;

pub use manage::Manage;
pub use watcher::ConfigWatcher;
