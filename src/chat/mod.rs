//! Voice chat dispatch: turns final transcripts into chat requests and
//! keeps a bounded conversation history.

pub mod dispatcher;
pub mod history;

pub use dispatcher::ChatDispatcher;
pub use history::{ConversationHistory, ConversationTurn, Role};
