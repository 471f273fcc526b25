//! 会话级订阅注册表
//!
//! 消息订阅与输入状态订阅各自独立登记，键为会话 ID，每个会话
//! 每种事件最多一个活跃订阅。所有事件都经由当前用户的私有频道
//! 投递，注册表负责按事件类型与会话 ID 路由。

use crate::chat::channel::ChannelProvisioner;
use crate::chat::error::Result;
use crate::chat::message::{Message, TypingEvent, TypingState};
use crate::chat::pubsub::{PubsubClient, SubscriptionHandle};
use crate::chat::serialization::parse_iso8601;
use crate::chat::subscription::listener::{MessageSubscriptionHandler, TypingSubscriptionHandler};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// 私有频道上的事件载荷
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ChannelEvent {
    Message {
        conversation_id: String,
        record: Value,
    },
    Typing {
        conversation_id: String,
        user_id: String,
        state: String,
        timestamp: Option<String>,
    },
}

struct SubscriptionEntry {
    handle: SubscriptionHandle,
}

/// 订阅注册表
pub struct SubscriptionRegistry {
    pubsub: Arc<dyn PubsubClient>,
    provisioner: ChannelProvisioner,
    message_subscriptions: Mutex<HashMap<String, SubscriptionEntry>>,
    typing_subscriptions: Mutex<HashMap<String, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    pub fn new(pubsub: Arc<dyn PubsubClient>, provisioner: ChannelProvisioner) -> Self {
        Self {
            pubsub,
            provisioner,
            message_subscriptions: Mutex::new(HashMap::new()),
            typing_subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// 订阅会话新消息（同会话重复订阅为 no-op）
    pub async fn subscribe_message(
        &self,
        conversation_id: &str,
        handler: Arc<dyn MessageSubscriptionHandler>,
    ) -> Result<()> {
        let mut subscriptions = self.message_subscriptions.lock().await;
        if subscriptions.contains_key(conversation_id) {
            debug!(
                "[Subscription] 会话 {} 已有消息订阅, 忽略重复订阅",
                conversation_id
            );
            return Ok(());
        }

        let channel = match self.provisioner.get_or_create_user_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("[Subscription] 私有频道获取失败: {}", e);
                let handler = handler.clone();
                tokio::spawn(async move { handler.on_subscription_fail(e.to_string()).await });
                return Ok(());
            }
        };

        let expected = conversation_id.to_string();
        let routing_handler = handler.clone();
        let route = Arc::new(move |payload: Value| {
            let Some(ChannelEvent::Message {
                conversation_id,
                record,
            }) = decode_event(&payload)
            else {
                return;
            };
            if conversation_id != expected {
                return;
            }
            match Message::from_json(&record) {
                Ok(message) => {
                    let handler = routing_handler.clone();
                    tokio::spawn(async move { handler.on_new_message(message).await });
                }
                Err(e) => error!("[Subscription] 丢弃无法解码的消息事件: {}", e),
            }
        });

        match self.pubsub.subscribe(&channel.name, route).await {
            Ok(handle) => {
                debug!("[Subscription] 👂 已订阅会话 {} 的消息事件", conversation_id);
                subscriptions.insert(conversation_id.to_string(), SubscriptionEntry { handle });
            }
            Err(e) => {
                warn!("[Subscription] 频道订阅失败: {}", e);
                tokio::spawn(async move { handler.on_subscription_fail(e.to_string()).await });
            }
        }
        Ok(())
    }

    /// 解除会话消息订阅（未订阅时为 no-op）
    pub async fn unsubscribe_message(&self, conversation_id: &str) {
        let removed = self
            .message_subscriptions
            .lock()
            .await
            .remove(conversation_id);
        if let Some(entry) = removed {
            if let Err(e) = self.pubsub.unsubscribe(entry.handle).await {
                warn!("[Subscription] 解除消息订阅失败（忽略）: {}", e);
            }
            debug!("[Subscription] 已解除会话 {} 的消息订阅", conversation_id);
        }
    }

    /// 订阅会话输入状态（同会话重复订阅为 no-op）
    pub async fn subscribe_typing(
        &self,
        conversation_id: &str,
        handler: Arc<dyn TypingSubscriptionHandler>,
    ) -> Result<()> {
        let mut subscriptions = self.typing_subscriptions.lock().await;
        if subscriptions.contains_key(conversation_id) {
            debug!(
                "[Subscription] 会话 {} 已有输入状态订阅, 忽略重复订阅",
                conversation_id
            );
            return Ok(());
        }

        let channel = match self.provisioner.get_or_create_user_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("[Subscription] 私有频道获取失败: {}", e);
                let handler = handler.clone();
                tokio::spawn(async move { handler.on_subscription_fail(e.to_string()).await });
                return Ok(());
            }
        };

        let expected = conversation_id.to_string();
        let routing_handler = handler.clone();
        let route = Arc::new(move |payload: Value| {
            let Some(ChannelEvent::Typing {
                conversation_id,
                user_id,
                state,
                timestamp,
            }) = decode_event(&payload)
            else {
                return;
            };
            if conversation_id != expected {
                return;
            }
            let Some(state) = TypingState::parse(&state) else {
                error!("[Subscription] 丢弃非法输入状态: {}", state);
                return;
            };
            let event = TypingEvent {
                user_id,
                state,
                timestamp: timestamp.and_then(|s| parse_iso8601(&s).ok()),
            };
            let handler = routing_handler.clone();
            tokio::spawn(async move { handler.on_typing(event).await });
        });

        match self.pubsub.subscribe(&channel.name, route).await {
            Ok(handle) => {
                debug!(
                    "[Subscription] ⌨️ 已订阅会话 {} 的输入状态事件",
                    conversation_id
                );
                subscriptions.insert(conversation_id.to_string(), SubscriptionEntry { handle });
            }
            Err(e) => {
                warn!("[Subscription] 频道订阅失败: {}", e);
                tokio::spawn(async move { handler.on_subscription_fail(e.to_string()).await });
            }
        }
        Ok(())
    }

    /// 解除会话输入状态订阅（未订阅时为 no-op）
    pub async fn unsubscribe_typing(&self, conversation_id: &str) {
        let removed = self
            .typing_subscriptions
            .lock()
            .await
            .remove(conversation_id);
        if let Some(entry) = removed {
            if let Err(e) = self.pubsub.unsubscribe(entry.handle).await {
                warn!("[Subscription] 解除输入状态订阅失败（忽略）: {}", e);
            }
            debug!(
                "[Subscription] 已解除会话 {} 的输入状态订阅",
                conversation_id
            );
        }
    }
}

fn decode_event(payload: &Value) -> Option<ChannelEvent> {
    match serde_json::from_value(payload.clone()) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("[Subscription] 丢弃无法识别的频道事件: {}", e);
            None
        }
    }
}
