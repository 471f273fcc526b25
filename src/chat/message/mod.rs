//! 消息域：模型与服务

pub mod models;
pub mod service;

pub use models::{Message, MessageReceipt, ReceiptStatus, TypingEvent, TypingState};
pub use service::MessageService;
