//! Pub/Sub 协作方接口与默认 WebSocket 实现
//!
//! 订阅回调运行在共享的读取任务上下文中，不保证与调用方同线程。
//! 解除订阅后，已经投递到传输层的事件仍可能再触发一次。

use crate::chat::error::{ChatError, Result};
use crate::chat::serialization::{decompress_gzip, is_gzip};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

/// pub/sub 事件回调（参数为频道载荷）
pub type PubsubHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// 订阅句柄，由 [`PubsubClient::subscribe`] 返回，用于解除订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Pub/Sub 客户端接口
#[async_trait]
pub trait PubsubClient: Send + Sync {
    /// 在指定频道上注册回调
    async fn subscribe(&self, channel: &str, handler: PubsubHandler) -> Result<SubscriptionHandle>;

    /// 注销回调（句柄未注册时为 no-op）
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct ChannelBinding {
    channel: String,
    handler: PubsubHandler,
}

/// 默认 WebSocket pub/sub 实现
///
/// 出站帧为 `{"action":"sub"|"unsub","channel":..}`，
/// 入站帧为 `{"channel":.., "data":..}`；gzip 帧透明解压。
pub struct WsPubsubClient {
    writer: Arc<Mutex<WsWriter>>,
    bindings: Arc<Mutex<HashMap<u64, ChannelBinding>>>,
    next_handle: AtomicU64,
    heartbeat_task: tokio::task::JoinHandle<()>,
    reader_task: tokio::task::JoinHandle<()>,
}

/// 登记回调，返回是否需要向服务器发 sub 帧（频道首个回调才需要）
fn register_binding(
    bindings: &mut HashMap<u64, ChannelBinding>,
    id: u64,
    channel: &str,
    handler: PubsubHandler,
) -> bool {
    let already_open = bindings.values().any(|b| b.channel == channel);
    bindings.insert(
        id,
        ChannelBinding {
            channel: channel.to_string(),
            handler,
        },
    );
    !already_open
}

/// 移除回调，返回其频道名与是否需要向服务器发 unsub 帧（频道最后一个
/// 回调移除后才需要）；句柄未登记时返回 None
fn discard_binding(
    bindings: &mut HashMap<u64, ChannelBinding>,
    id: u64,
) -> Option<(String, bool)> {
    let removed = bindings.remove(&id)?;
    let still_bound = bindings.values().any(|b| b.channel == removed.channel);
    Some((removed.channel, !still_bound))
}

impl WsPubsubClient {
    /// 连接 pub/sub 服务器并启动读取与心跳任务
    pub async fn connect(ws_url: &str, token: &str) -> Result<Self> {
        let url = format!("{}/pubsub?token={}", ws_url, token);
        info!("[Pubsub] 🔗 连接 pub/sub 服务器");

        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChatError::Backend(format!("WebSocket 连接失败: {e}")))?;
        info!("[Pubsub] ✅ WebSocket 连接成功, 状态: {}", response.status());

        let (write, read) = ws_stream.split();
        let writer = Arc::new(Mutex::new(write));
        let bindings: Arc<Mutex<HashMap<u64, ChannelBinding>>> =
            Arc::new(Mutex::new(HashMap::new()));

        // 心跳
        let writer_for_heartbeat = writer.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(25));
            loop {
                ticker.tick().await;
                let mut w = writer_for_heartbeat.lock().await;
                if w.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        // 读取循环
        let bindings_for_reader = bindings.clone();
        let reader_task = tokio::spawn(async move {
            Self::read_loop(read, bindings_for_reader).await;
        });

        Ok(Self {
            writer,
            bindings,
            next_handle: AtomicU64::new(1),
            heartbeat_task,
            reader_task,
        })
    }

    /// 关闭连接：停掉心跳与读取任务并发送 Close 帧
    pub async fn close(&self) {
        self.heartbeat_task.abort();
        self.reader_task.abort();
        let mut w = self.writer.lock().await;
        if w.send(WsMessage::Close(None)).await.is_err() {
            debug!("[Pubsub] 发送 Close 帧失败, 连接可能已断开");
        }
        info!("[Pubsub] 👋 连接已关闭");
    }

    async fn read_loop(mut read: WsReader, bindings: Arc<Mutex<HashMap<u64, ChannelBinding>>>) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(WsMessage::Text(text)) => {
                    Self::dispatch_frame(text.as_bytes(), &bindings).await;
                }
                Ok(WsMessage::Binary(data)) => {
                    let payload = if is_gzip(&data) {
                        match decompress_gzip(&data) {
                            Ok(d) => d,
                            Err(e) => {
                                error!("[Pubsub] 解压失败: {}", e);
                                continue;
                            }
                        }
                    } else {
                        data
                    };
                    Self::dispatch_frame(&payload, &bindings).await;
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    warn!("[Pubsub] 👋 连接关闭: {:?}", frame);
                    break;
                }
                Err(e) => {
                    error!("[Pubsub] WebSocket 错误: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    async fn dispatch_frame(raw: &[u8], bindings: &Mutex<HashMap<u64, ChannelBinding>>) {
        let frame: serde_json::Value = match serde_json::from_slice(raw) {
            Ok(v) => v,
            Err(e) => {
                debug!("[Pubsub] 丢弃非法帧: {}", e);
                return;
            }
        };
        let Some(channel) = frame.get("channel").and_then(|v| v.as_str()) else {
            debug!("[Pubsub] 丢弃缺少 channel 字段的帧");
            return;
        };
        let data = frame.get("data").cloned().unwrap_or(serde_json::Value::Null);

        let guard = bindings.lock().await;
        for binding in guard.values() {
            if binding.channel == channel {
                (binding.handler)(data.clone());
            }
        }
    }

    async fn send_action(&self, action: &str, channel: &str) -> Result<()> {
        let frame = serde_json::json!({"action": action, "channel": channel});
        let mut w = self.writer.lock().await;
        w.send(WsMessage::Text(frame.to_string()))
            .await
            .map_err(|e| ChatError::Backend(format!("发送 {action} 帧失败: {e}")))
    }
}

impl Drop for WsPubsubClient {
    fn drop(&mut self) {
        self.heartbeat_task.abort();
        self.reader_task.abort();
    }
}

#[async_trait]
impl PubsubClient for WsPubsubClient {
    async fn subscribe(&self, channel: &str, handler: PubsubHandler) -> Result<SubscriptionHandle> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let need_sub = {
            let mut guard = self.bindings.lock().await;
            register_binding(&mut guard, id, channel, handler)
        };
        // 同一频道只向服务器订阅一次
        if need_sub {
            if let Err(e) = self.send_action("sub", channel).await {
                // 发送失败必须撤销登记, 否则同频道后续订阅会误判已向
                // 服务器订阅而跳过 sub 帧
                self.bindings.lock().await.remove(&id);
                return Err(e);
            }
        }
        debug!("[Pubsub] ➕ 订阅频道: {} (handle={})", channel, id);
        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let discarded = {
            let mut guard = self.bindings.lock().await;
            discard_binding(&mut guard, handle.0)
        };
        if let Some((channel, need_unsub)) = discarded {
            if need_unsub {
                self.send_action("unsub", &channel).await?;
            }
            debug!("[Pubsub] ➖ 解除订阅: {} (handle={})", channel, handle.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> PubsubHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn test_failed_sub_send_rollback_allows_retry() {
        let mut bindings = HashMap::new();
        assert!(register_binding(&mut bindings, 1, "chan", noop_handler()));
        // sub 帧发送失败, 撤销登记
        bindings.remove(&1);

        // 撤销后同频道的下一次订阅必须重新向服务器发 sub 帧
        assert!(register_binding(&mut bindings, 2, "chan", noop_handler()));
        // 解除该订阅时也要发 unsub 帧, 不能被残留登记挡住
        assert_eq!(
            discard_binding(&mut bindings, 2),
            Some(("chan".to_string(), true))
        );
    }

    #[test]
    fn test_shared_channel_subscribes_once_and_unsubs_after_last() {
        let mut bindings = HashMap::new();
        assert!(register_binding(&mut bindings, 1, "chan", noop_handler()));
        assert!(!register_binding(&mut bindings, 2, "chan", noop_handler()));

        let (channel, need_unsub) = discard_binding(&mut bindings, 1).unwrap();
        assert_eq!(channel, "chan");
        assert!(!need_unsub);

        let (channel, need_unsub) = discard_binding(&mut bindings, 2).unwrap();
        assert_eq!(channel, "chan");
        assert!(need_unsub);

        assert!(discard_binding(&mut bindings, 99).is_none());
    }
}
