//! 聊天客户端命令行工具
//!
//! 连接后端与 pub/sub 服务器，列出会话并实时打印订阅到的
//! 新消息与输入状态事件，用于联调与演示。

use anyhow::Result;
use chat_sdk_core_rust::chat::backend::{BackendConfig, HttpBackendClient};
use chat_sdk_core_rust::chat::message::{Message, TypingEvent};
use chat_sdk_core_rust::chat::pubsub::WsPubsubClient;
use chat_sdk_core_rust::chat::subscription::{
    MessageSubscriptionHandler, TypingSubscriptionHandler,
};
use chat_sdk_core_rust::ChatContainer;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(about = "聊天客户端命令行工具", long_about = None)]
struct Args {
    /// HTTP API 地址
    #[arg(long, default_value = "http://127.0.0.1:10002")]
    api_url: String,

    /// WebSocket 地址
    #[arg(long, default_value = "ws://127.0.0.1:10001")]
    ws_url: String,

    /// 认证 token
    #[arg(long)]
    token: String,

    /// 当前用户 ID
    #[arg(long)]
    user_id: String,

    /// 要订阅的会话 ID（可多次指定）
    #[arg(long)]
    conversation: Vec<String>,

    /// 运行时长（秒），0 表示一直运行
    #[arg(long, default_value = "0")]
    duration: u64,

    /// 日志级别
    #[arg(long, default_value = "info,chat_sdk_core_rust=debug")]
    log_level: String,
}

fn init_logger(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

struct CliMessageHandler {
    conversation_id: String,
}

#[async_trait::async_trait]
impl MessageSubscriptionHandler for CliMessageHandler {
    async fn on_new_message(&self, message: Message) {
        info!(
            "[CLI] 📨 [{}] 新消息 {}: {}",
            self.conversation_id,
            message.id(),
            message.body().unwrap_or("<无正文>")
        );
    }

    async fn on_subscription_fail(&self, reason: String) {
        warn!("[CLI] 消息订阅失败 [{}]: {}", self.conversation_id, reason);
    }
}

struct CliTypingHandler {
    conversation_id: String,
}

#[async_trait::async_trait]
impl TypingSubscriptionHandler for CliTypingHandler {
    async fn on_typing(&self, event: TypingEvent) {
        info!(
            "[CLI] ⌨️ [{}] {} -> {}",
            self.conversation_id,
            event.user_id,
            event.state.as_str()
        );
    }

    async fn on_subscription_fail(&self, reason: String) {
        warn!(
            "[CLI] 输入状态订阅失败 [{}]: {}",
            self.conversation_id, reason
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    info!("[CLI] 🚀 启动聊天客户端: user_id={}", args.user_id);

    let backend = Arc::new(HttpBackendClient::new(BackendConfig {
        api_base_url: args.api_url.clone(),
        token: args.token.clone(),
        user_id: args.user_id.clone(),
    })?);
    let pubsub = Arc::new(WsPubsubClient::connect(&args.ws_url, &args.token).await?);
    let container = ChatContainer::new(backend, pubsub.clone());

    match container.get_conversations(true).await {
        Ok(conversations) => {
            info!("[CLI] 📋 会话数: {}", conversations.len());
            for conversation in conversations.iter().take(5) {
                info!(
                    "[CLI]   - {} {} (未读 {})",
                    conversation.id(),
                    conversation.title().unwrap_or("<未命名>"),
                    conversation.unread_count()
                );
            }
        }
        Err(e) => error!("[CLI] 获取会话列表失败: {}", e),
    }

    match container.get_total_unread_message_count().await {
        Ok(total) => info!("[CLI] 📬 未读总数: {}", total),
        Err(e) => warn!("[CLI] 获取未读总数失败: {}", e),
    }

    for conversation_id in &args.conversation {
        container
            .subscribe_conversation_message(
                conversation_id,
                Arc::new(CliMessageHandler {
                    conversation_id: conversation_id.clone(),
                }),
            )
            .await?;
        container
            .subscribe_typing_indicator(
                conversation_id,
                Arc::new(CliTypingHandler {
                    conversation_id: conversation_id.clone(),
                }),
            )
            .await?;
        info!("[CLI] 👂 已订阅会话: {}", conversation_id);
    }

    if args.duration > 0 {
        info!("[CLI] ⏰ 运行 {} 秒后退出", args.duration);
        tokio::time::sleep(tokio::time::Duration::from_secs(args.duration)).await;
    } else {
        info!("[CLI] 按 Ctrl+C 退出");
        tokio::signal::ctrl_c().await?;
    }

    for conversation_id in &args.conversation {
        container.unsubscribe_conversation_message(conversation_id).await;
        container.unsubscribe_typing_indicator(conversation_id).await;
    }
    pubsub.close().await;
    info!("[CLI] 👋 退出");
    Ok(())
}
