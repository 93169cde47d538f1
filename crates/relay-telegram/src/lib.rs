//! Telegram Bot API as the operator side of the relay.

pub mod client;
pub mod operator;
pub mod poller;
pub mod types;

pub use client::{ClientBuildError, ClientOptions, TelegramClient, DEFAULT_API_BASE};
pub use operator::{annotate, TelegramOperator};
pub use poller::UpdatePoller;
