//! 统一错误类型
//!
//! 所有异步操作通过各自的 `Result` 失败分支上报错误，绝不跨异步边界抛出。

use thiserror::Error;

/// 聊天核心错误分类
#[derive(Debug, Error)]
pub enum ChatError {
    /// 无有效登录会话时访问私有资源
    #[error("认证失败: {0}")]
    Authentication(String),

    /// 更新时重新拉取不到目标资源
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// RPC / 记录存取调用失败（携带服务端返回的信息）
    #[error("后端错误: {0}")]
    Backend(String),

    /// RPC 或 pub/sub 返回的 JSON 载荷格式非法
    #[error("解码失败: {0}")]
    Decode(String),

    /// 发起网络调用前的同步参数校验失败
    #[error("参数校验失败: {0}")]
    Validation(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Backend(e.to_string())
    }
}

impl From<chrono::ParseError> for ChatError {
    fn from(e: chrono::ParseError) -> Self {
        ChatError::Decode(format!("时间戳解析失败: {e}"))
    }
}

/// crate 内统一 Result 别名
pub type Result<T> = std::result::Result<T, ChatError>;
