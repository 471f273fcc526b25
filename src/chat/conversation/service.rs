//! 会话服务
//!
//! 会话更新走读-改-写流程：每次更新先重新拉取最新记录，再套用改动
//! 整体保存。并发更新不做乐观锁，后保存者覆盖先保存者。

use crate::chat::backend::BackendClient;
use crate::chat::conversation::models::{
    Conversation, ConversationOptions, DISTINCT_BY_PARTICIPANTS_KEY, METADATA_KEY, TITLE_KEY,
};
use crate::chat::error::{ChatError, Result};
use crate::chat::types::rpc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// 会话列表默认分页
const GET_CONVERSATIONS_DEFAULT_PAGE: u32 = 1;
const GET_CONVERSATIONS_DEFAULT_PAGE_SIZE: u32 = 50;

/// 会话服务
#[derive(Clone)]
pub struct ConversationService {
    backend: Arc<dyn BackendClient>,
}

impl ConversationService {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// 创建会话
    pub async fn create_conversation(
        &self,
        participant_ids: &[String],
        title: Option<&str>,
        metadata: Option<Value>,
        options: Option<ConversationOptions>,
    ) -> Result<Conversation> {
        if participant_ids.is_empty() {
            return Err(ChatError::Validation(
                "参与者列表不能为空".to_string(),
            ));
        }
        info!(
            "[Conversation] ➕ 创建会话, 参与者数: {}",
            participant_ids.len()
        );
        let result = self
            .backend
            .call_remote_procedure(
                rpc::CREATE_CONVERSATION,
                json!([
                    participant_ids,
                    title,
                    metadata.unwrap_or(Value::Null),
                    options.map(|o| o.to_json()).unwrap_or(Value::Null),
                ]),
            )
            .await?;
        decode_conversation(&result)
    }

    /// 创建与单个用户的一对一会话（按参与者去重，重复创建复用已有会话）
    pub async fn create_direct_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<Conversation> {
        let current = self.backend.current_user_id().ok_or_else(|| {
            ChatError::Authentication("未登录，无法创建一对一会话".to_string())
        })?;
        let options = ConversationOptions {
            admin_ids: None,
            distinct_by_participants: true,
        };
        self.create_conversation(
            &[current, user_id.to_string()],
            title,
            metadata,
            Some(options),
        )
        .await
    }

    /// 获取单个会话
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
        include_last_message: bool,
    ) -> Result<Conversation> {
        let result = self
            .backend
            .call_remote_procedure(
                rpc::GET_CONVERSATION,
                json!([conversation_id, include_last_message]),
            )
            .await?;
        decode_conversation(&result)
    }

    /// 获取当前用户的会话列表（默认分页）
    pub async fn get_conversations(&self, include_last_message: bool) -> Result<Vec<Conversation>> {
        self.get_conversations_page(
            GET_CONVERSATIONS_DEFAULT_PAGE,
            GET_CONVERSATIONS_DEFAULT_PAGE_SIZE,
            include_last_message,
        )
        .await
    }

    /// 按页获取会话列表
    pub async fn get_conversations_page(
        &self,
        page: u32,
        page_size: u32,
        include_last_message: bool,
    ) -> Result<Vec<Conversation>> {
        let result = self
            .backend
            .call_remote_procedure(
                rpc::GET_CONVERSATIONS,
                json!([page, page_size, include_last_message]),
            )
            .await?;
        let items = result
            .get("conversations")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        items.iter().map(Conversation::from_json).collect()
    }

    /// 读-改-写更新会话
    ///
    /// 先重新拉取最新记录（拉取失败视为会话不存在），在最新记录上
    /// 套用 `changes` 后整体写回，未改动的字段原样保留。
    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        changes: Map<String, Value>,
    ) -> Result<Conversation> {
        debug!(
            "[Conversation] 更新会话 {} ({} 处改动)",
            conversation_id,
            changes.len()
        );
        let fetched = self
            .get_conversation(conversation_id, true)
            .await
            .map_err(|_| {
                ChatError::NotFound(format!("找不到会话: {conversation_id}"))
            })?;

        let mut record = fetched.into_record();
        for (key, value) in changes {
            record.set(&key, value);
        }
        let saved = self.backend.save_record(record).await?;
        Conversation::from_record(saved)
    }

    /// 修改会话标题
    pub async fn set_title(&self, conversation_id: &str, title: &str) -> Result<Conversation> {
        let mut changes = Map::new();
        changes.insert(TITLE_KEY.to_string(), json!(title));
        self.update_conversation(conversation_id, changes).await
    }

    /// 替换会话元数据
    pub async fn set_metadata(
        &self,
        conversation_id: &str,
        metadata: Value,
    ) -> Result<Conversation> {
        let mut changes = Map::new();
        changes.insert(METADATA_KEY.to_string(), metadata);
        self.update_conversation(conversation_id, changes).await
    }

    /// 修改按参与者去重标记
    pub async fn set_distinct_by_participants(
        &self,
        conversation_id: &str,
        distinct: bool,
    ) -> Result<Conversation> {
        let mut changes = Map::new();
        changes.insert(DISTINCT_BY_PARTICIPANTS_KEY.to_string(), json!(distinct));
        self.update_conversation(conversation_id, changes).await
    }

    async fn update_membership(
        &self,
        procedure: &'static str,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        if user_ids.is_empty() {
            return Err(ChatError::Validation("用户列表不能为空".to_string()));
        }
        let result = self
            .backend
            .call_remote_procedure(procedure, json!([conversation_id, user_ids]))
            .await?;
        decode_conversation(&result)
    }

    pub async fn add_admins(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.update_membership(rpc::ADD_ADMINS, conversation_id, user_ids)
            .await
    }

    pub async fn remove_admins(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.update_membership(rpc::REMOVE_ADMINS, conversation_id, user_ids)
            .await
    }

    pub async fn add_participants(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.update_membership(rpc::ADD_PARTICIPANTS, conversation_id, user_ids)
            .await
    }

    pub async fn remove_participants(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Conversation> {
        self.update_membership(rpc::REMOVE_PARTICIPANTS, conversation_id, user_ids)
            .await
    }

    /// 退出会话
    pub async fn leave_conversation(&self, conversation_id: &str) -> Result<()> {
        self.backend
            .call_remote_procedure(rpc::LEAVE_CONVERSATION, json!([conversation_id]))
            .await?;
        info!("[Conversation] 👋 已退出会话: {}", conversation_id);
        Ok(())
    }

    /// 删除会话
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.backend
            .call_remote_procedure(rpc::DELETE_CONVERSATION, json!([conversation_id]))
            .await?;
        info!("[Conversation] 🗑️ 已删除会话: {}", conversation_id);
        Ok(())
    }

    /// 当前用户所有会话的未读消息总数
    pub async fn total_unread(&self) -> Result<i64> {
        let result = self
            .backend
            .call_remote_procedure(rpc::TOTAL_UNREAD, json!([]))
            .await?;
        result
            .get("message")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ChatError::Decode("未读总数响应缺少 message 字段".to_string()))
    }
}

fn decode_conversation(result: &Value) -> Result<Conversation> {
    let payload = result.get("conversation").unwrap_or(result);
    Conversation::from_json(payload)
}
