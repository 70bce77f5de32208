pub mod message;
pub mod transport;

pub use message::{Message, MessageType};
pub use transport::{MessageHandler, PeerAddr, Transport};
