//! 测试替身
//!
//! [`MockBackend`] 同时把每次调用转发到一个 mpsc 通道，测试可以
//! 等待后台任务（如回执上报）发起的调用，而不用靠 sleep 碰运气。

use crate::chat::backend::BackendClient;
use crate::chat::channel::USER_CHANNEL_TYPE;
use crate::chat::error::{ChatError, Result};
use crate::chat::pubsub::{PubsubClient, PubsubHandler, SubscriptionHandle};
use crate::chat::types::Record;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

/// 后端收到的一次调用
#[derive(Debug, Clone)]
pub enum BackendCall {
    Rpc { name: String, args: Value },
    Save(Record),
    Query { record_type: String },
}

/// 可编程的后端替身
pub struct MockBackend {
    user_id: Option<String>,
    calls: StdMutex<Vec<BackendCall>>,
    rpc_results: StdMutex<HashMap<String, Value>>,
    rpc_failures: StdMutex<HashMap<String, String>>,
    query_results: StdMutex<HashMap<String, Vec<Record>>>,
    events: mpsc::UnboundedSender<BackendCall>,
}

impl MockBackend {
    pub fn new(user_id: Option<&str>) -> (Arc<Self>, mpsc::UnboundedReceiver<BackendCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Arc::new(Self {
            user_id: user_id.map(str::to_string),
            calls: StdMutex::new(Vec::new()),
            rpc_results: StdMutex::new(HashMap::new()),
            rpc_failures: StdMutex::new(HashMap::new()),
            query_results: StdMutex::new(HashMap::new()),
            events: tx,
        });
        (backend, rx)
    }

    pub fn set_rpc_result(&self, name: &str, result: Value) {
        self.rpc_results
            .lock()
            .unwrap()
            .insert(name.to_string(), result);
    }

    pub fn set_rpc_failure(&self, name: &str, message: &str) {
        self.rpc_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), message.to_string());
    }

    pub fn set_query_result(&self, record_type: &str, records: Vec<Record>) {
        self.query_results
            .lock()
            .unwrap()
            .insert(record_type.to_string(), records);
    }

    pub fn recorded_calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call.clone());
        let _ = self.events.send(call);
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn call_remote_procedure(&self, name: &str, args: Value) -> Result<Value> {
        self.record_call(BackendCall::Rpc {
            name: name.to_string(),
            args,
        });
        if let Some(message) = self.rpc_failures.lock().unwrap().get(name) {
            return Err(ChatError::Backend(message.clone()));
        }
        Ok(self
            .rpc_results
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    async fn save_record(&self, record: Record) -> Result<Record> {
        self.record_call(BackendCall::Save(record.clone()));
        Ok(record)
    }

    async fn query_records(&self, record_type: &str, _filter: Value) -> Result<Vec<Record>> {
        self.record_call(BackendCall::Query {
            record_type: record_type.to_string(),
        });
        Ok(self
            .query_results
            .lock()
            .unwrap()
            .get(record_type)
            .cloned()
            .unwrap_or_default())
    }

    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

/// 可编程的 pub/sub 替身，`publish` 模拟服务器向频道投递事件
pub struct MockPubsub {
    bindings: Mutex<HashMap<u64, (String, PubsubHandler)>>,
    next_handle: AtomicU64,
    subscribe_calls: AtomicUsize,
    fail_subscribe: StdMutex<Option<String>>,
}

impl MockPubsub {
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            subscribe_calls: AtomicUsize::new(0),
            fail_subscribe: StdMutex::new(None),
        }
    }

    pub fn fail_next_subscribe(&self, message: &str) {
        *self.fail_subscribe.lock().unwrap() = Some(message.to_string());
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::Relaxed)
    }

    /// 向频道上的所有回调投递一个事件
    pub async fn publish(&self, channel: &str, payload: Value) {
        let guard = self.bindings.lock().await;
        for (bound_channel, handler) in guard.values() {
            if bound_channel == channel {
                handler(payload.clone());
            }
        }
    }
}

#[async_trait]
impl PubsubClient for MockPubsub {
    async fn subscribe(&self, channel: &str, handler: PubsubHandler) -> Result<SubscriptionHandle> {
        if let Some(message) = self.fail_subscribe.lock().unwrap().take() {
            return Err(ChatError::Backend(message));
        }
        self.subscribe_calls.fetch_add(1, Ordering::Relaxed);
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.bindings
            .lock()
            .await
            .insert(id, (channel.to_string(), handler));
        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.bindings.lock().await.remove(&handle.0);
        Ok(())
    }
}

/// 构造一条 user_channel 记录
pub fn user_channel_record(name: &str) -> Record {
    let mut record = Record::new(USER_CHANNEL_TYPE);
    record.set("name", json!(name));
    record
}
