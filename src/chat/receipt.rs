//! 送达 / 已读回执上报
//!
//! 回执上报是尽力而为的后台动作：调用立即返回，RPC 在独立任务中
//! 执行，失败只记日志，不影响触发它的读路径。

use crate::chat::backend::BackendClient;
use crate::chat::message::Message;
use crate::chat::types::rpc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 回执跟踪器
#[derive(Clone)]
pub struct ReceiptTracker {
    backend: Arc<dyn BackendClient>,
}

impl ReceiptTracker {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// 标记消息已送达（后台执行，不等待结果）
    pub fn mark_delivered(&self, messages: &[Message]) {
        self.dispatch(rpc::MARK_AS_DELIVERED, "已送达", messages);
    }

    /// 标记消息已读（后台执行，不等待结果）
    pub fn mark_read(&self, messages: &[Message]) {
        self.dispatch(rpc::MARK_AS_READ, "已读", messages);
    }

    fn dispatch(&self, procedure: &'static str, label: &'static str, messages: &[Message]) {
        let ids: Vec<String> = messages.iter().map(|m| m.id().to_string()).collect();
        if ids.is_empty() {
            debug!("[Receipt] 消息列表为空，跳过{}上报", label);
            return;
        }

        let backend = self.backend.clone();
        let count = ids.len();
        tokio::spawn(async move {
            match backend.call_remote_procedure(procedure, json!([ids])).await {
                Ok(_) => info!("[Receipt] ✅ 已标记 {} 条消息为{}", count, label),
                Err(e) => warn!("[Receipt] 标记{}失败（忽略）: {}", label, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{BackendCall, MockBackend};
    use serde_json::Value;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_empty_list_skips_rpc() {
        let (backend, _events) = MockBackend::new(Some("u1"));
        let tracker = ReceiptTracker::new(backend.clone());

        tracker.mark_delivered(&[]);
        tracker.mark_read(&[]);
        sleep(Duration::from_millis(20)).await;

        assert!(backend.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_sends_all_ids_in_one_call() {
        let (backend, mut events) = MockBackend::new(Some("u1"));
        let tracker = ReceiptTracker::new(backend.clone());

        let m1 = Message::new("c1");
        let m2 = Message::new("c1");
        tracker.mark_read(&[m1.clone(), m2.clone()]);

        match events.recv().await.unwrap() {
            BackendCall::Rpc { name, args } => {
                assert_eq!(name, rpc::MARK_AS_READ);
                let ids: Vec<&str> = args[0]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(Value::as_str)
                    .map(Option::unwrap)
                    .collect();
                assert_eq!(ids, vec![m1.id(), m2.id()]);
            }
            other => panic!("期望 RPC 调用, 实际为 {other:?}"),
        }
    }
}
