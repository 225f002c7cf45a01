//! Core domain + application logic for the wall relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the VK HTTP API
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod conversation;
pub mod crosspost;
pub mod digest;
pub mod domain;
pub mod errors;
pub mod filter;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod profiles;
pub mod storage;
pub mod utils;
pub mod watermark;

pub use errors::{Error, Result};
