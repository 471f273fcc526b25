//! 消息数据模型

use crate::chat::error::{ChatError, Result};
use crate::chat::serialization::parse_iso8601;
use crate::chat::types::{Record, Reference};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// 消息记录类型
pub const MESSAGE_TYPE: &str = "message";

pub const CONVERSATION_KEY: &str = "conversation";
pub const BODY_KEY: &str = "body";
pub const ATTACHMENT_KEY: &str = "attachment";
pub const METADATA_KEY: &str = "metadata";

const CREATED_AT_KEY: &str = "_created_at";
const EDITED_AT_KEY: &str = "edited_at";

/// 消息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    record: Record,
}

impl Message {
    /// 新建一条归属于指定会话、尚未保存的消息
    pub fn new(conversation_id: &str) -> Self {
        let mut record = Record::new(MESSAGE_TYPE);
        record.set(
            CONVERSATION_KEY,
            Reference::new("conversation", conversation_id).to_json(),
        );
        Self { record }
    }

    /// 从记录构造（校验记录类型）
    pub fn from_record(record: Record) -> Result<Self> {
        if record.record_type != MESSAGE_TYPE {
            return Err(ChatError::Decode(format!(
                "期望 message 记录, 实际为 {}",
                record.record_type
            )));
        }
        Ok(Self { record })
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        Self::from_record(Record::from_json(value)?)
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.record
            .get(CONVERSATION_KEY)
            .and_then(Reference::from_json)
            .map(|r| r.id)
    }

    /// 重设归属会话
    pub fn set_conversation(&mut self, conversation_id: &str) {
        self.record.set(
            CONVERSATION_KEY,
            Reference::new("conversation", conversation_id).to_json(),
        );
    }

    pub fn body(&self) -> Option<&str> {
        self.record.get(BODY_KEY).and_then(|v| v.as_str())
    }

    pub fn set_body(&mut self, body: &str) {
        self.record.set(BODY_KEY, Value::String(body.to_string()));
    }

    pub fn attachment(&self) -> Option<&Value> {
        self.record.get(ATTACHMENT_KEY)
    }

    pub fn set_attachment(&mut self, attachment: Value) {
        self.record.set(ATTACHMENT_KEY, attachment);
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.record.get(METADATA_KEY).and_then(|v| v.as_object())
    }

    pub fn set_metadata(&mut self, metadata: Value) {
        self.record.set(METADATA_KEY, metadata);
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.record
            .get(CREATED_AT_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| parse_iso8601(s).ok())
    }

    pub fn edited_at(&self) -> Option<DateTime<Utc>> {
        self.record
            .get(EDITED_AT_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| parse_iso8601(s).ok())
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

/// 回执状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Delivered,
    Read,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Delivered => "delivered",
            ReceiptStatus::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(ReceiptStatus::Delivered),
            "read" => Some(ReceiptStatus::Read),
            _ => None,
        }
    }
}

/// 单个用户对某条消息的回执
#[derive(Debug, Clone, PartialEq)]
pub struct MessageReceipt {
    pub user_id: String,
    pub status: ReceiptStatus,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MessageReceipt {
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ChatError::Decode("回执必须是 JSON 对象".to_string()))?;
        let user_id = obj
            .get("user_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChatError::Decode("回执缺少 user_id 字段".to_string()))?;
        let status = obj
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(ReceiptStatus::parse)
            .ok_or_else(|| ChatError::Decode("回执 status 字段非法".to_string()))?;
        let timestamp = obj
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| parse_iso8601(s).ok());
        Ok(Self {
            user_id: user_id.to_string(),
            status,
            timestamp,
        })
    }
}

/// 输入状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Begin,
    Pause,
    Finished,
}

impl TypingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypingState::Begin => "begin",
            TypingState::Pause => "pause",
            TypingState::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "begin" => Some(TypingState::Begin),
            "pause" => Some(TypingState::Pause),
            "finished" => Some(TypingState::Finished),
            _ => None,
        }
    }
}

/// 会话内的输入状态事件
#[derive(Debug, Clone, PartialEq)]
pub struct TypingEvent {
    pub user_id: String,
    pub state: TypingState,
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_message_carries_conversation_reference() {
        let message = Message::new("c1");
        assert_eq!(message.conversation_id(), Some("c1".to_string()));
        assert_eq!(
            message.record().get(CONVERSATION_KEY),
            Some(&json!({"$type": "ref", "$id": "conversation/c1"}))
        );
    }

    #[test]
    fn test_message_body_and_timestamps() {
        let mut record = Record::with_id(MESSAGE_TYPE, "m1");
        record.set(BODY_KEY, json!("你好"));
        record.set(CREATED_AT_KEY, json!("2024-05-01T12:30:45.000Z"));
        let message = Message::from_record(record).unwrap();

        assert_eq!(message.body(), Some("你好"));
        assert!(message.created_at().is_some());
        assert!(message.edited_at().is_none());
    }

    #[test]
    fn test_receipt_decoding() {
        let receipt = MessageReceipt::from_json(&json!({
            "user_id": "u1",
            "status": "read",
            "timestamp": "2024-05-01T12:30:45.000Z",
        }))
        .unwrap();
        assert_eq!(receipt.user_id, "u1");
        assert_eq!(receipt.status, ReceiptStatus::Read);
        assert!(receipt.timestamp.is_some());

        assert!(MessageReceipt::from_json(&json!({"user_id": "u1", "status": "???"})).is_err());
        assert!(MessageReceipt::from_json(&json!({"status": "read"})).is_err());
    }

    #[test]
    fn test_typing_state_round_trip() {
        for state in [TypingState::Begin, TypingState::Pause, TypingState::Finished] {
            assert_eq!(TypingState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TypingState::parse("typing"), None);
    }
}
