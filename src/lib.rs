pub mod chat;

// 重新导出常用类型，方便外部使用
pub use chat::container::ChatContainer;
pub use chat::error::{ChatError, Result};
