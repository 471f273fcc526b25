//! 订阅事件处理器接口
//!
//! 处理器回调在独立任务中执行，不阻塞频道分发。

use crate::chat::message::{Message, TypingEvent};
use async_trait::async_trait;

/// 会话新消息事件处理器
#[async_trait]
pub trait MessageSubscriptionHandler: Send + Sync {
    /// 收到会话内的新消息
    async fn on_new_message(&self, message: Message);

    /// 订阅建立失败（私有频道供给或传输层订阅失败）
    async fn on_subscription_fail(&self, reason: String) {
        let _ = reason;
    }
}

/// 会话输入状态事件处理器
#[async_trait]
pub trait TypingSubscriptionHandler: Send + Sync {
    /// 收到会话内某个用户的输入状态变化
    async fn on_typing(&self, event: TypingEvent);

    /// 订阅建立失败
    async fn on_subscription_fail(&self, reason: String) {
        let _ = reason;
    }
}
