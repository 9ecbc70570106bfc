//! Conversation state and the streaming turn loop.

mod history;
mod session;

pub use history::History;
pub use session::{ChatSession, SessionHandle};
