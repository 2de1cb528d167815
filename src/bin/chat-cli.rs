//! 聊天 CLI 客户端（测试版）
//!
//! 启动时打开与指定联系人的会话，打印收到的事件，并把标准输入的每一行作为消息发送。
//! 以 `/file <路径>` 开头的行作为附件发送，`/quit` 退出。

use anyhow::{Context, Result};
use clap::Parser;
use chat_sdk_core_rust::{
    ChatClient, ClientConfig, ContactSnapshot, ConversationListener, EventChannel, Message,
    MessageId, MessageStatus, OutgoingAttachment, WsEventChannel,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// 聊天 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(about = "聊天 CLI 客户端 - 用于测试一对一会话同步", long_about = None)]
struct Args {
    /// 当前用户 ID
    #[arg(short, long)]
    user_id: u64,

    /// 认证 token
    #[arg(short, long, default_value = "")]
    token: String,

    /// 要打开会话的联系人 ID
    #[arg(short, long)]
    contact: u64,

    /// HTTP API 基础地址
    #[arg(long, default_value = "http://localhost:5000")]
    api_base_url: String,

    /// 事件通道 WebSocket 地址
    #[arg(long, default_value = "ws://localhost:5000")]
    ws_url: String,

    /// 日志级别（默认: info,chat_sdk_core_rust=debug）
    #[arg(long, default_value = "info,chat_sdk_core_rust=debug")]
    log_level: String,

    /// 日志文件
    #[arg(long, default_value = "debug.log")]
    log_file: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str, log_file: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("无法创建日志文件 {}", log_file))?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: {}", log_file);
    Ok(())
}

struct CliListener;

#[async_trait::async_trait]
impl ConversationListener for CliListener {
    async fn on_messages_changed(&self, messages: Vec<Message>) {
        if let Some(last) = messages.last() {
            info!(
                "[CLI/Message] 📨 共 {} 条消息，最新: {} -> {}",
                messages.len(),
                last.sender_id,
                last.preview()
            );
        }
    }

    async fn on_message_status_changed(&self, message_id: MessageId, status: MessageStatus) {
        info!("[CLI/Message] ✔️ 消息 {} 状态: {:?}", message_id, status);
    }

    async fn on_peer_typing_changed(&self, typing: bool) {
        if typing {
            info!("[CLI/Typing] ⌨️ 对方正在输入...");
        } else {
            info!("[CLI/Typing] ⌨️ 对方停止输入");
        }
    }

    async fn on_contacts_changed(&self, contacts: Vec<ContactSnapshot>) {
        info!("[CLI/Contact] 👥 联系人列表更新，共 {} 个", contacts.len());
    }

    async fn on_unread_message(&self, contact: ContactSnapshot, message: Message) {
        info!(
            "[CLI/Contact] 🔔 {}: {}",
            contact.contact_user_name,
            message.preview()
        );
    }

    async fn on_connection_status_changed(&self, connected: bool) {
        if connected {
            info!("[CLI] 🔗 已重新连接");
        } else {
            error!("[CLI] 🔗 连接断开，等待自动重连");
        }
    }
}

async fn handle_line(client: &ChatClient, line: &str) -> Result<()> {
    let line = line.trim();
    if let Some(path) = line.strip_prefix("/file ") {
        let attachment = OutgoingAttachment::from_path(path.trim())
            .await
            .with_context(|| format!("读取附件失败: {}", path))?;
        client.send(None, vec![attachment]).await?;
    } else {
        client.input_changed().await;
        client.send(Some(line), Vec::new()).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level, &args.log_file)?;

    info!("[CLI] 🚀 聊天 CLI 客户端");
    info!("[CLI] 👤 用户ID: {}, 联系人: {}", args.user_id, args.contact);

    let mut config = ClientConfig::new(args.user_id, args.token);
    config.api_base_url = args.api_base_url;
    config.ws_url = args.ws_url;

    let api = chat_sdk_core_rust::HttpChatApi::new(config.api_base_url.clone(), &config.token)?;
    let channel = WsEventChannel::new(config.ws_channel_config());
    let client = ChatClient::with_parts(config, Arc::new(api), Arc::new(channel.clone()));
    client.set_listener(Arc::new(CliListener));

    info!("[CLI] 🔗 正在连接服务器...");
    channel
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("连接失败: {}", e))?;

    match client.refresh_contacts().await {
        Ok(_) => info!("[CLI] 📬 未读消息共 {} 条", client.total_pending().await),
        Err(e) => warn!("[CLI] ⚠️ 拉取联系人列表失败: {}", e),
    }
    let history = client
        .open_conversation(args.contact)
        .await
        .map_err(|e| anyhow::anyhow!("打开会话失败: {}", e))?;
    info!("[CLI] 📋 历史消息 {} 条", history.len());
    for message in history.iter().rev().take(10).rev() {
        info!("[CLI]   {} | {}", message.sender_id, message.preview());
    }

    info!("[CLI] 💡 输入消息后回车发送，/file <路径> 发送附件，/quit 退出");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == "/quit" {
            break;
        }
        if let Err(e) = handle_line(&client, &line).await {
            error!("[CLI] ❌ {}", e);
        }
    }

    client.shutdown().await;
    channel.close().await;
    info!("[CLI] 👋 程序退出");
    Ok(())
}
