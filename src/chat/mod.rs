//! 聊天客户端实时同步核心
//!
//! 管理会话级事件订阅（新消息、输入状态）、用户私有通知频道的按需创建，
//! 以及消息送达/已读状态与服务端的对账。记录存取与 pub/sub 传输通过
//! [`backend::BackendClient`] / [`pubsub::PubsubClient`] 两个协作方接口接入。

pub mod backend;
pub mod channel;
pub mod container;
pub mod conversation;
pub mod error;
pub mod message;
pub mod pubsub;
pub mod receipt;
pub mod serialization;
pub mod subscription;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出主要类型
pub use container::ChatContainer;
pub use error::{ChatError, Result};
