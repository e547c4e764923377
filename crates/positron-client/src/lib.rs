//! Client side of Positron: chat window state, the relay stream consumer,
//! saved chats and sign-in.

pub mod chats;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod relay;
pub mod render;
pub mod session;
pub mod sidebar;
pub mod stream;

pub use conversation::Conversation;
pub use error::ClientError;
pub use session::ChatSession;
