//! Outbound alert channels

mod log;
mod telegram;
pub mod templates;

pub use self::log::LogNotifier;
pub use telegram::TelegramNotifier;
