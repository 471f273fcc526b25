//! 后端协作方接口与默认 HTTP 实现
//!
//! 核心组件只依赖 [`BackendClient`] 接口；[`HttpBackendClient`] 是
//! 开箱即用的 HTTP 实现，认证 token 通过 `default_headers` 自动附加。

use crate::chat::error::{ChatError, Result};
use crate::chat::types::Record;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

/// 后端客户端接口（RPC 调用与记录存取）
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// 调用远端过程，`args` 为按顺序排列的位置参数数组
    async fn call_remote_procedure(&self, name: &str, args: Value) -> Result<Value>;

    /// 保存记录，返回服务端落库后的版本
    async fn save_record(&self, record: Record) -> Result<Record>;

    /// 按类型查询当前会话用户可见的记录
    async fn query_records(&self, record_type: &str, filter: Value) -> Result<Vec<Record>>;

    /// 当前登录用户 ID（无会话时为 None）
    fn current_user_id(&self) -> Option<String>;
}

/// HTTP 后端配置
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// 认证 token
    pub token: String,
    /// 当前用户 ID
    pub user_id: String,
}

/// 默认 HTTP 后端实现
pub struct HttpBackendClient {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackendClient {
    /// 创建 HTTP 后端客户端（token 通过 default_headers 自动添加）
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("token"),
                    reqwest::header::HeaderValue::from_str(&config.token)
                        .map_err(|_| ChatError::Validation("无效的 token".to_string()))?,
                );
                headers
            })
            .build()?;
        Ok(Self { client, config })
    }

    async fn post(&self, path: &str, body: Value, operation_name: &str) -> Result<Value> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.config.api_base_url, path);
        debug!(
            "[Backend] 📡 {}: {} (操作ID: {})",
            operation_name, url, operation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&body)
            .send()
            .await?;

        handle_response(response, operation_name).await
    }
}

/// 通用 HTTP 响应处理：校验状态码与错误包装，返回 `result` 字段
pub async fn handle_response(response: reqwest::Response, operation_name: &str) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        error!(
            "[Backend] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body
        );
        return Err(ChatError::Backend(format!("HTTP 错误 {status}: {body}")));
    }
    debug!("[Backend] {}请求成功，HTTP状态: {}", operation_name, status);

    let json: Value = serde_json::from_str(&body)?;
    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("未知错误");
        error!("[Backend] {}服务器错误: {}", operation_name, message);
        return Err(ChatError::Backend(message.to_string()));
    }

    Ok(json.get("result").cloned().unwrap_or(Value::Null))
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn call_remote_procedure(&self, name: &str, args: Value) -> Result<Value> {
        self.post("/rpc", json!({"name": name, "args": args}), name)
            .await
    }

    async fn save_record(&self, record: Record) -> Result<Record> {
        let result = self
            .post(
                "/record/save",
                json!({"record": record.to_json()}),
                "保存记录",
            )
            .await?;
        Record::from_json(result.get("record").unwrap_or(&result))
    }

    async fn query_records(&self, record_type: &str, filter: Value) -> Result<Vec<Record>> {
        let result = self
            .post(
                "/record/query",
                json!({"record_type": record_type, "filter": filter}),
                "查询记录",
            )
            .await?;
        let items = result
            .get("records")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        items.iter().map(Record::from_json).collect()
    }

    fn current_user_id(&self) -> Option<String> {
        if self.config.user_id.is_empty() {
            None
        } else {
            Some(self.config.user_id.clone())
        }
    }
}
