mod client;
mod error;
pub mod capture;
pub mod conversation;
pub mod events;
pub mod playback;
pub mod tools;
pub mod turns;
#[cfg(test)]
mod testing;

pub use gemini_live_types as types;
pub use gemini_live_utils as utils;

pub use client::config::{Config, ConfigBuilder, ConfigError};
pub use client::stats::Stats;
pub use client::transport::{Transport, WebSocketTransport, WsSink, WsStream};
pub use client::{connect, ConnectionState, Session, SessionConnection};
pub use conversation::{Control, Conversation, ConversationConfig, Notice};
pub use error::ClientError;
pub use events::{EventRx, SessionEvent};
