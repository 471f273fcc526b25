//! 聊天客户端入口
//!
//! [`ChatContainer`] 聚合各域服务并提供统一调用面。协作方通过
//! 构造函数显式注入，不依赖任何全局单例；同一进程可以并存多个
//! 互不干扰的实例。

use crate::chat::backend::BackendClient;
use crate::chat::channel::ChannelProvisioner;
use crate::chat::conversation::{Conversation, ConversationOptions, ConversationService};
use crate::chat::error::Result;
use crate::chat::message::{Message, MessageReceipt, MessageService, TypingState};
use crate::chat::pubsub::PubsubClient;
use crate::chat::receipt::ReceiptTracker;
use crate::chat::subscription::{
    MessageSubscriptionHandler, SubscriptionRegistry, TypingSubscriptionHandler,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// 聊天客户端
pub struct ChatContainer {
    conversations: ConversationService,
    messages: MessageService,
    receipts: ReceiptTracker,
    registry: SubscriptionRegistry,
}

impl ChatContainer {
    /// 用给定的后端与 pub/sub 客户端装配聊天客户端
    pub fn new(backend: Arc<dyn BackendClient>, pubsub: Arc<dyn PubsubClient>) -> Self {
        info!("[Chat] 🚀 初始化聊天客户端");
        let receipts = ReceiptTracker::new(backend.clone());
        Self {
            conversations: ConversationService::new(backend.clone()),
            messages: MessageService::new(backend.clone(), receipts.clone()),
            receipts,
            registry: SubscriptionRegistry::new(pubsub, ChannelProvisioner::new(backend)),
        }
    }

    // ---- 会话 ----

    pub async fn create_conversation(
        &self,
        participant_ids: &[String],
        title: Option<&str>,
        metadata: Option<Value>,
        options: Option<ConversationOptions>,
    ) -> Result<Conversation> {
        self.conversations
            .create_conversation(participant_ids, title, metadata, options)
            .await
    }

    pub async fn create_direct_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<Conversation> {
        self.conversations
            .create_direct_conversation(user_id, title, metadata)
            .await
    }

    pub async fn get_conversation(
        &self,
        conversation_id: &str,
        include_last_message: bool,
    ) -> Result<Conversation> {
        self.conversations
            .get_conversation(conversation_id, include_last_message)
            .await
    }

    pub async fn get_conversations(&self, include_last_message: bool) -> Result<Vec<Conversation>> {
        self.conversations.get_conversations(include_last_message).await
    }

    pub async fn get_conversations_page(
        &self,
        page: u32,
        page_size: u32,
        include_last_message: bool,
    ) -> Result<Vec<Conversation>> {
        self.conversations
            .get_conversations_page(page, page_size, include_last_message)
            .await
    }

    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        changes: serde_json::Map<String, Value>,
    ) -> Result<Conversation> {
        self.conversations
            .update_conversation(conversation_id, changes)
            .await
    }

    pub async fn set_conversation_title(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<Conversation> {
        self.conversations.set_title(conversation_id, title).await
    }

    pub async fn set_conversation_metadata(
        &self,
        conversation_id: &str,
        metadata: Value,
    ) -> Result<Conversation> {
        self.conversations.set_metadata(conversation_id, metadata).await
    }

    pub async fn set_conversation_distinct_by_participants(
        &self,
        conversation_id: &str,
        distinct: bool,
    ) -> Result<Conversation> {
        self.conversations
            .set_distinct_by_participants(conversation_id, distinct)
            .await
    }

    pub async fn add_conversation_admin(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation> {
        self.add_conversation_admins(conversation_id, &[user_id.to_string()])
            .await
    }

    pub async fn add_conversation_admins(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.conversations.add_admins(conversation_id, user_ids).await
    }

    pub async fn remove_conversation_admin(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation> {
        self.remove_conversation_admins(conversation_id, &[user_id.to_string()])
            .await
    }

    pub async fn remove_conversation_admins(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.conversations.remove_admins(conversation_id, user_ids).await
    }

    pub async fn add_conversation_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation> {
        self.add_conversation_participants(conversation_id, &[user_id.to_string()])
            .await
    }

    pub async fn add_conversation_participants(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.conversations
            .add_participants(conversation_id, user_ids)
            .await
    }

    pub async fn remove_conversation_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation> {
        self.remove_conversation_participants(conversation_id, &[user_id.to_string()])
            .await
    }

    pub async fn remove_conversation_participants(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.conversations
            .remove_participants(conversation_id, user_ids)
            .await
    }

    pub async fn leave_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations.leave_conversation(conversation_id).await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations.delete_conversation(conversation_id).await
    }

    pub async fn get_total_unread_message_count(&self) -> Result<i64> {
        self.conversations.total_unread().await
    }

    // ---- 消息 ----

    pub async fn get_messages(
        &self,
        conversation_id: &str,
        limit: i64,
        before: Option<chrono::DateTime<chrono::Utc>>,
        order: Option<&str>,
    ) -> Result<Vec<Message>> {
        self.messages
            .get_messages(conversation_id, limit, before, order)
            .await
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        body: Option<&str>,
        attachment: Option<Value>,
        metadata: Option<Value>,
    ) -> Result<Message> {
        self.messages
            .send_message(conversation_id, body, attachment, metadata)
            .await
    }

    pub async fn add_message(&self, message: Message, conversation_id: &str) -> Result<Message> {
        self.messages.add_message(message, conversation_id).await
    }

    pub async fn edit_message(&self, message: Message, body: &str) -> Result<Message> {
        self.messages.edit_message(message, body).await
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.messages.delete_message(message_id).await
    }

    pub async fn get_message_receipts(&self, message_id: &str) -> Result<Vec<MessageReceipt>> {
        self.messages.get_message_receipts(message_id).await
    }

    pub async fn send_typing_indicator(
        &self,
        conversation_id: &str,
        state: TypingState,
    ) -> Result<()> {
        self.messages
            .send_typing_indicator(conversation_id, state)
            .await
    }

    // ---- 回执 ----

    pub fn mark_message_as_delivered(&self, message: &Message) {
        self.receipts.mark_delivered(std::slice::from_ref(message));
    }

    pub fn mark_messages_as_delivered(&self, messages: &[Message]) {
        self.receipts.mark_delivered(messages);
    }

    pub fn mark_message_as_read(&self, message: &Message) {
        self.receipts.mark_read(std::slice::from_ref(message));
    }

    pub fn mark_messages_as_read(&self, messages: &[Message]) {
        self.receipts.mark_read(messages);
    }

    /// 把某条消息记为会话的最后已读位置
    pub fn mark_conversation_last_read_message(&self, message: &Message) {
        self.receipts.mark_read(std::slice::from_ref(message));
    }

    // ---- 订阅 ----

    pub async fn subscribe_conversation_message(
        &self,
        conversation_id: &str,
        handler: Arc<dyn MessageSubscriptionHandler>,
    ) -> Result<()> {
        self.registry.subscribe_message(conversation_id, handler).await
    }

    pub async fn unsubscribe_conversation_message(&self, conversation_id: &str) {
        self.registry.unsubscribe_message(conversation_id).await
    }

    pub async fn subscribe_typing_indicator(
        &self,
        conversation_id: &str,
        handler: Arc<dyn TypingSubscriptionHandler>,
    ) -> Result<()> {
        self.registry.subscribe_typing(conversation_id, handler).await
    }

    pub async fn unsubscribe_typing_indicator(&self, conversation_id: &str) {
        self.registry.unsubscribe_typing(conversation_id).await
    }
}
