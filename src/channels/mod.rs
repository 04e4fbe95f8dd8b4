//! Dialogue channels — the text and voice transports the engine talks through.

pub mod dialogue;
pub mod text;
pub mod voice;

pub use dialogue::{ChannelMode, DialogueChannel};
pub use text::TextChannel;
pub use voice::VoiceChannel;
