//! Outbound chat messaging abstractions (Telegram is the only adapter).

pub mod port;
pub mod throttled;
pub mod types;
