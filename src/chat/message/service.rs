//! 消息服务
//!
//! 历史消息拉取成功后自动触发送达回执（后台执行，见 receipt 模块）。

use crate::chat::backend::BackendClient;
use crate::chat::error::{ChatError, Result};
use crate::chat::message::models::{Message, MessageReceipt, TypingState};
use crate::chat::receipt::ReceiptTracker;
use crate::chat::serialization::{now_iso8601, to_iso8601};
use crate::chat::types::rpc;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// 历史消息默认拉取条数
pub const GET_MESSAGES_DEFAULT_LIMIT: i64 = 50;

/// 消息服务
#[derive(Clone)]
pub struct MessageService {
    backend: Arc<dyn BackendClient>,
    receipts: ReceiptTracker,
}

impl MessageService {
    pub fn new(backend: Arc<dyn BackendClient>, receipts: ReceiptTracker) -> Self {
        Self { backend, receipts }
    }

    /// 拉取会话历史消息（按时间倒序），并自动上报送达回执
    ///
    /// `limit` 不为正时使用默认条数；`before` 缺省为当前时间。
    pub async fn get_messages(
        &self,
        conversation_id: &str,
        limit: i64,
        before: Option<DateTime<Utc>>,
        order: Option<&str>,
    ) -> Result<Vec<Message>> {
        let limit = if limit <= 0 {
            GET_MESSAGES_DEFAULT_LIMIT
        } else {
            limit
        };
        let before = before.map(|t| to_iso8601(&t)).unwrap_or_else(now_iso8601);

        debug!(
            "[Message] 📥 拉取会话 {} 历史消息, limit={}",
            conversation_id, limit
        );
        let result = self
            .backend
            .call_remote_procedure(
                rpc::GET_MESSAGES,
                json!([conversation_id, limit, before, order]),
            )
            .await?;

        let items = result
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let mut messages = Vec::with_capacity(items.len());
        for item in &items {
            match Message::from_json(item) {
                Ok(message) => messages.push(message),
                Err(e) => error!("[Message] 跳过无法解码的消息: {}", e),
            }
        }

        self.receipts.mark_delivered(&messages);
        Ok(messages)
    }

    /// 发送新消息（body / attachment / metadata 至少提供一项）
    pub async fn send_message(
        &self,
        conversation_id: &str,
        body: Option<&str>,
        attachment: Option<Value>,
        metadata: Option<Value>,
    ) -> Result<Message> {
        let body = body.map(str::trim).filter(|s| !s.is_empty());
        if body.is_none() && attachment.is_none() && metadata.is_none() {
            return Err(ChatError::Validation(
                "body、attachment、metadata 至少需要提供一项".to_string(),
            ));
        }

        let mut message = Message::new(conversation_id);
        if let Some(body) = body {
            message.set_body(body);
        }
        if let Some(attachment) = attachment {
            message.set_attachment(attachment);
        }
        if let Some(metadata) = metadata {
            message.set_metadata(metadata);
        }
        self.save_message(message).await
    }

    /// 把一条已构造好的消息挂到指定会话并保存
    pub async fn add_message(&self, mut message: Message, conversation_id: &str) -> Result<Message> {
        message.set_conversation(conversation_id);
        self.save_message(message).await
    }

    /// 编辑消息正文后保存
    pub async fn edit_message(&self, mut message: Message, body: &str) -> Result<Message> {
        message.set_body(body);
        self.save_message(message).await
    }

    async fn save_message(&self, message: Message) -> Result<Message> {
        let saved = self.backend.save_record(message.into_record()).await?;
        let message = Message::from_record(saved)?;
        info!("[Message] 📨 消息已保存: {}", message.id());
        Ok(message)
    }

    /// 删除消息
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.backend
            .call_remote_procedure(rpc::DELETE_MESSAGE, json!([message_id]))
            .await?;
        info!("[Message] 🗑️ 消息已删除: {}", message_id);
        Ok(())
    }

    /// 查询一条消息的逐用户回执
    pub async fn get_message_receipts(&self, message_id: &str) -> Result<Vec<MessageReceipt>> {
        let result = self
            .backend
            .call_remote_procedure(rpc::GET_RECEIPT, json!([message_id]))
            .await?;
        let items = result
            .get("receipts")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        items.iter().map(MessageReceipt::from_json).collect()
    }

    /// 向会话广播当前用户的输入状态
    pub async fn send_typing_indicator(
        &self,
        conversation_id: &str,
        state: TypingState,
    ) -> Result<()> {
        debug!(
            "[Message] ⌨️ 发送输入状态: {} -> {}",
            state.as_str(),
            conversation_id
        );
        self.backend
            .call_remote_procedure(
                rpc::TYPING,
                json!([conversation_id, state.as_str(), now_iso8601()]),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::models::{BODY_KEY, MESSAGE_TYPE};
    use crate::chat::testing::{BackendCall, MockBackend};
    use tokio::time::{sleep, Duration};

    fn message_json(id: &str, body: &str) -> Value {
        json!({
            "_id": format!("{MESSAGE_TYPE}/{id}"),
            "body": body,
            "conversation": {"$type": "ref", "$id": "conversation/c1"},
        })
    }

    fn service(backend: Arc<MockBackend>) -> MessageService {
        let receipts = ReceiptTracker::new(backend.clone());
        MessageService::new(backend, receipts)
    }

    #[tokio::test]
    async fn test_send_message_requires_some_content() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        let service = service(backend.clone());

        let err = service
            .send_message("c1", Some("   "), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(backend.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_saves_body_and_reference() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        let service = service(backend.clone());

        let message = service
            .send_message("c1", Some("你好"), None, None)
            .await
            .unwrap();
        assert_eq!(message.body(), Some("你好"));
        assert_eq!(message.conversation_id(), Some("c1".to_string()));

        match &backend.recorded_calls()[0] {
            BackendCall::Save(record) => {
                assert_eq!(record.record_type, MESSAGE_TYPE);
                assert_eq!(record.get(BODY_KEY), Some(&json!("你好")));
            }
            other => panic!("期望保存调用, 实际为 {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_message_reattaches_conversation() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        let service = service(backend.clone());

        let mut message = Message::new("c1");
        message.set_body("搬运");
        let saved = service.add_message(message, "c2").await.unwrap();

        assert_eq!(saved.conversation_id(), Some("c2".to_string()));
    }

    #[tokio::test]
    async fn test_get_messages_marks_delivered_once() {
        let (backend, mut events) = MockBackend::new(Some("u1"));
        backend.set_rpc_result(
            rpc::GET_MESSAGES,
            json!({"results": [message_json("m1", "a"), message_json("m2", "b")]}),
        );
        let service = service(backend.clone());

        let messages = service.get_messages("c1", 0, None, None).await.unwrap();
        assert_eq!(messages.len(), 2);

        // 第一条是拉取 RPC
        match events.recv().await.unwrap() {
            BackendCall::Rpc { name, args } => {
                assert_eq!(name, rpc::GET_MESSAGES);
                assert_eq!(args[1], json!(GET_MESSAGES_DEFAULT_LIMIT));
            }
            other => panic!("期望 RPC 调用, 实际为 {other:?}"),
        }
        // 随后是后台送达回执
        match events.recv().await.unwrap() {
            BackendCall::Rpc { name, args } => {
                assert_eq!(name, rpc::MARK_AS_DELIVERED);
                assert_eq!(args[0], json!(["m1", "m2"]));
            }
            other => panic!("期望 RPC 调用, 实际为 {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_messages_empty_result_sends_no_receipt() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        backend.set_rpc_result(rpc::GET_MESSAGES, json!({"results": []}));
        let service = service(backend.clone());

        let messages = service.get_messages("c1", 10, None, None).await.unwrap();
        assert!(messages.is_empty());
        sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_get_messages_skips_malformed_entries() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        backend.set_rpc_result(
            rpc::GET_MESSAGES,
            json!({"results": [message_json("m1", "a"), {"garbage": true}]}),
        );
        let service = service(backend.clone());

        let messages = service.get_messages("c1", 10, None, None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), "m1");
    }

    #[tokio::test]
    async fn test_typing_indicator_arg_shape() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        let service = service(backend.clone());

        service
            .send_typing_indicator("c1", TypingState::Begin)
            .await
            .unwrap();

        match &backend.recorded_calls()[0] {
            BackendCall::Rpc { name, args } => {
                assert_eq!(name, rpc::TYPING);
                assert_eq!(args[0], json!("c1"));
                assert_eq!(args[1], json!("begin"));
                assert!(args[2].as_str().unwrap().ends_with('Z'));
            }
            other => panic!("期望 RPC 调用, 实际为 {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_message_receipts_decodes_list() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        backend.set_rpc_result(
            rpc::GET_RECEIPT,
            json!({"receipts": [
                {"user_id": "u2", "status": "delivered"},
                {"user_id": "u3", "status": "read", "timestamp": "2024-05-01T12:00:00.000Z"},
            ]}),
        );
        let service = service(backend.clone());

        let receipts = service.get_message_receipts("m1").await.unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[1].user_id, "u3");
    }
}
