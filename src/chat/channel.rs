//! 私有用户频道的按需供给
//!
//! 每个登录用户对应一条 `user_channel` 记录，其 `name` 字段是该用户
//! 的私有 pub/sub 频道名。频道在首次需要时惰性创建；多端并发首次
//! 订阅时可能各自创建一条记录，以后端最终收敛的记录为准。

use crate::chat::backend::BackendClient;
use crate::chat::error::{ChatError, Result};
use crate::chat::types::Record;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 用户频道记录类型
pub const USER_CHANNEL_TYPE: &str = "user_channel";

const NAME_KEY: &str = "name";

/// 私有频道描述
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// 频道记录 ID
    pub id: String,
    /// pub/sub 频道名
    pub name: String,
}

/// 私有频道供给器：查询已有频道记录，没有则创建一条
#[derive(Clone)]
pub struct ChannelProvisioner {
    backend: Arc<dyn BackendClient>,
}

impl ChannelProvisioner {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// 获取当前用户的私有频道，必要时创建
    ///
    /// 查询由后端按会话用户限定范围；存在多条记录时取第一条。
    pub async fn get_or_create_user_channel(&self) -> Result<Channel> {
        if self.backend.current_user_id().is_none() {
            return Err(ChatError::Authentication(
                "未登录，无法获取私有频道".to_string(),
            ));
        }

        let records = self
            .backend
            .query_records(USER_CHANNEL_TYPE, Value::Null)
            .await?;
        if let Some(record) = records.into_iter().next() {
            debug!("[Channel] 复用已有私有频道记录: {}", record.id);
            return channel_from_record(&record);
        }

        let mut record = Record::new(USER_CHANNEL_TYPE);
        record.set(NAME_KEY, json!(Uuid::new_v4().to_string()));
        let saved = self.backend.save_record(record).await?;
        info!("[Channel] ✅ 已创建私有频道记录: {}", saved.id);
        channel_from_record(&saved)
    }
}

fn channel_from_record(record: &Record) -> Result<Channel> {
    let name = record
        .get(NAME_KEY)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ChatError::Decode("user_channel 记录缺少 name 字段".to_string()))?;
    Ok(Channel {
        id: record.id.clone(),
        name: name.to_string(),
    })
}
