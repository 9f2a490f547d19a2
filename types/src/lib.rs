pub mod session;
pub mod tools;
pub mod audio;
pub mod events;
mod content;

pub use content::{Blob, Content, Part};
pub use events::{ClientMessage, ServerMessage};
pub use session::{SessionConfig, SessionConfigurator};
