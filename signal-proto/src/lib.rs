//! Shared protocol definitions for the signaling wire format.

pub mod codec;
pub mod message;

pub use codec::CodecError;
pub use message::{Message, MessageType};
