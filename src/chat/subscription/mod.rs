//! 订阅域：会话级事件订阅

pub mod listener;
pub mod registry;

pub use listener::{MessageSubscriptionHandler, TypingSubscriptionHandler};
pub use registry::SubscriptionRegistry;
