//! 会话数据模型
//!
//! [`Conversation`] 是服务端记录的强类型视图：已建模字段提供访问器，
//! 未建模字段仍保留在底层记录中，更新流程整体写回。

use crate::chat::error::{ChatError, Result};
use crate::chat::types::{Record, Reference};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// 会话记录类型
pub const CONVERSATION_TYPE: &str = "conversation";

pub const TITLE_KEY: &str = "title";
pub const LAST_MESSAGE_KEY: &str = "last_message";
pub const ADMIN_IDS_KEY: &str = "admin_ids";
pub const PARTICIPANT_IDS_KEY: &str = "participant_ids";
pub const DISTINCT_BY_PARTICIPANTS_KEY: &str = "distinct_by_participant";
pub const METADATA_KEY: &str = "metadata";
pub const UNREAD_COUNT_KEY: &str = "unread_count";
pub const LAST_READ_MESSAGE_KEY: &str = "last_read_message";

/// 创建会话时的可选项
#[derive(Debug, Clone, Default)]
pub struct ConversationOptions {
    /// 管理员集合；None 表示由服务端默认（创建者为管理员）
    pub admin_ids: Option<HashSet<String>>,
    /// 按参与者集合去重（相同集合复用已有会话）
    pub distinct_by_participants: bool,
}

impl ConversationOptions {
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let Some(ids) = &self.admin_ids {
            let mut sorted: Vec<&String> = ids.iter().collect();
            sorted.sort();
            obj.insert(ADMIN_IDS_KEY.to_string(), json!(sorted));
        }
        obj.insert(
            DISTINCT_BY_PARTICIPANTS_KEY.to_string(),
            json!(self.distinct_by_participants),
        );
        Value::Object(obj)
    }
}

/// 会话
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    record: Record,
}

impl Conversation {
    /// 从记录构造（校验记录类型）
    pub fn from_record(record: Record) -> Result<Self> {
        if record.record_type != CONVERSATION_TYPE {
            return Err(ChatError::Decode(format!(
                "期望 conversation 记录, 实际为 {}",
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

    pub fn title(&self) -> Option<&str> {
        self.record.get(TITLE_KEY).and_then(|v| v.as_str())
    }

    pub fn participant_ids(&self) -> HashSet<String> {
        id_set(self.record.get(PARTICIPANT_IDS_KEY))
    }

    pub fn admin_ids(&self) -> HashSet<String> {
        id_set(self.record.get(ADMIN_IDS_KEY))
    }

    pub fn is_distinct_by_participants(&self) -> bool {
        self.record
            .get(DISTINCT_BY_PARTICIPANTS_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.record.get(METADATA_KEY).and_then(|v| v.as_object())
    }

    /// 当前用户在该会话中的未读消息数
    pub fn unread_count(&self) -> i64 {
        self.record
            .get(UNREAD_COUNT_KEY)
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    pub fn last_message_id(&self) -> Option<String> {
        self.record
            .get(LAST_MESSAGE_KEY)
            .and_then(Reference::from_json)
            .map(|r| r.id)
    }

    pub fn last_read_message_id(&self) -> Option<String> {
        self.record
            .get(LAST_READ_MESSAGE_KEY)
            .and_then(Reference::from_json)
            .map(|r| r.id)
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn to_json(&self) -> Value {
        self.record.to_json()
    }
}

fn id_set(value: Option<&Value>) -> HashSet<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let mut record = Record::with_id(CONVERSATION_TYPE, "c1");
        record.set(TITLE_KEY, json!("项目群"));
        record.set(PARTICIPANT_IDS_KEY, json!(["u1", "u2"]));
        record.set(ADMIN_IDS_KEY, json!(["u1"]));
        record.set(UNREAD_COUNT_KEY, json!(3));
        record.set(METADATA_KEY, json!({"pinned": true}));
        record.set(
            LAST_MESSAGE_KEY,
            Reference::new("message", "m9").to_json(),
        );
        record
    }

    #[test]
    fn test_conversation_accessors() {
        let conversation = Conversation::from_record(sample_record()).unwrap();
        assert_eq!(conversation.id(), "c1");
        assert_eq!(conversation.title(), Some("项目群"));
        assert_eq!(
            conversation.participant_ids(),
            HashSet::from(["u1".to_string(), "u2".to_string()])
        );
        assert_eq!(conversation.admin_ids(), HashSet::from(["u1".to_string()]));
        assert_eq!(conversation.unread_count(), 3);
        assert_eq!(conversation.last_message_id(), Some("m9".to_string()));
        assert_eq!(conversation.last_read_message_id(), None);
        assert!(!conversation.is_distinct_by_participants());
    }

    #[test]
    fn test_from_record_rejects_other_types() {
        let record = Record::with_id("message", "m1");
        assert!(Conversation::from_record(record).is_err());
    }

    #[test]
    fn test_options_to_json() {
        let options = ConversationOptions {
            admin_ids: Some(HashSet::from(["u2".to_string(), "u1".to_string()])),
            distinct_by_participants: true,
        };
        let encoded = options.to_json();
        assert_eq!(encoded[ADMIN_IDS_KEY], json!(["u1", "u2"]));
        assert_eq!(encoded[DISTINCT_BY_PARTICIPANTS_KEY], json!(true));

        let default_encoded = ConversationOptions::default().to_json();
        assert!(default_encoded.get(ADMIN_IDS_KEY).is_none());
        assert_eq!(default_encoded[DISTINCT_BY_PARTICIPANTS_KEY], json!(false));
    }
}
