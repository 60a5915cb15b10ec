pub mod config;
pub mod notifier;
pub mod sms;

pub use config::{RxConfig, SenderConfig, SmsConfig};
pub use notifier::{Notifier, SmtpNotifier};
pub use sms::{Phone, Provider};
