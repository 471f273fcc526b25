//! 通用数据结构与远端过程名
//!
//! 记录采用轻量包装：完整保留服务端返回的字段映射，
//! 读-改-写更新时未建模的字段才能原样写回。

use crate::chat::error::{ChatError, Result};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// 核心依赖的远端过程名（位置参数，顺序敏感，见各调用点）
pub mod rpc {
    pub const CREATE_CONVERSATION: &str = "create_conversation";
    pub const GET_CONVERSATION: &str = "get_conversation";
    pub const GET_CONVERSATIONS: &str = "get_conversations";
    pub const ADD_ADMINS: &str = "add_admins";
    pub const REMOVE_ADMINS: &str = "remove_admins";
    pub const ADD_PARTICIPANTS: &str = "add_participants";
    pub const REMOVE_PARTICIPANTS: &str = "remove_participants";
    pub const LEAVE_CONVERSATION: &str = "leave_conversation";
    pub const DELETE_CONVERSATION: &str = "delete_conversation";
    pub const TOTAL_UNREAD: &str = "total_unread";
    pub const GET_MESSAGES: &str = "get_messages";
    pub const MARK_AS_READ: &str = "mark_as_read";
    pub const MARK_AS_DELIVERED: &str = "mark_as_delivered";
    pub const GET_RECEIPT: &str = "get_receipt";
    pub const TYPING: &str = "typing";
    pub const DELETE_MESSAGE: &str = "delete_message";
}

/// 服务端记录
///
/// `_id` 编码为 `"type/id"`；其余字段原样保存在 `fields` 中。
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub record_type: String,
    pub id: String,
    fields: Map<String, Value>,
}

impl Record {
    /// 新建一条尚未保存的记录（记录 ID 在客户端生成）
    pub fn new(record_type: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            id: Uuid::new_v4().to_string(),
            fields: Map::new(),
        }
    }

    /// 按给定 ID 构造记录
    pub fn with_id(record_type: &str, id: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            id: id.to_string(),
            fields: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_json(&self) -> Value {
        let mut obj = self.fields.clone();
        obj.insert(
            "_id".to_string(),
            json!(format!("{}/{}", self.record_type, self.id)),
        );
        Value::Object(obj)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ChatError::Decode("记录必须是 JSON 对象".to_string()))?;
        let raw_id = obj
            .get("_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChatError::Decode("记录缺少 _id 字段".to_string()))?;
        let (record_type, id) = raw_id
            .split_once('/')
            .ok_or_else(|| ChatError::Decode(format!("_id 格式非法: {raw_id}")))?;

        let mut fields = obj.clone();
        fields.remove("_id");
        Ok(Self {
            record_type: record_type.to_string(),
            id: id.to_string(),
            fields,
        })
    }
}

/// 记录间引用，编码为 `{"$type":"ref","$id":"type/id"}`
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub record_type: String,
    pub id: String,
}

impl Reference {
    pub fn new(record_type: &str, id: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            id: id.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "$type": "ref",
            "$id": format!("{}/{}", self.record_type, self.id),
        })
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("$type").and_then(|v| v.as_str()) != Some("ref") {
            return None;
        }
        let raw_id = obj.get("$id").and_then(|v| v.as_str())?;
        let (record_type, id) = raw_id.split_once('/')?;
        Some(Self::new(record_type, id))
    }
}
