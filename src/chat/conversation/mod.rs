//! 会话域：模型与服务

pub mod models;
pub mod service;

pub use models::{Conversation, ConversationOptions};
pub use service::ConversationService;
