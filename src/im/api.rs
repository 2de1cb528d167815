//! 聊天 HTTP API 客户端
//!
//! 核心逻辑只依赖 [`ChatApi`]，真实请求由 [`HttpChatApi`] 通过 reqwest 发出

use crate::im::contact::models::{ContactDetail, ContactSnapshot};
use crate::im::error::FetchError;
use crate::im::message::models::{Message, OutgoingAttachment};
use crate::im::types::{handle_http_response, UserId};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// 拉取与某个联系人的历史消息
    async fn get_messages(&self, contact_id: UserId) -> Result<Vec<Message>, FetchError>;

    /// 拉取对方信息（显示名、免打扰、置顶）
    async fn get_contact_detail(
        &self,
        user_id: UserId,
        contact_id: UserId,
    ) -> Result<ContactDetail, FetchError>;

    /// 拉取联系人列表快照
    async fn get_contacts(&self) -> Result<Vec<ContactSnapshot>, FetchError>;

    /// 发送消息，返回服务器保存后的消息
    async fn send_message(
        &self,
        contact_id: UserId,
        text: Option<&str>,
        attachments: &[OutgoingAttachment],
    ) -> Result<Message, FetchError>;
}

/// 基于 reqwest 的 HTTP 实现
pub struct HttpChatApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpChatApi {
    /// 创建 API 客户端，token 通过 default_headers 自动附加到每个请求
    pub fn new(api_base_url: impl Into<String>, token: &str) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !token.is_empty() {
            headers.insert(
                reqwest::header::HeaderName::from_static("token"),
                reqwest::header::HeaderValue::from_str(token).context("无效的 token")?,
            );
        }
        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self::with_client(client, api_base_url))
    }

    /// 使用外部已配置好的 HTTP 客户端
    pub fn with_client(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn get_messages(&self, contact_id: UserId) -> Result<Vec<Message>, FetchError> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url(&format!("/api/get_messages/{}", contact_id));
        info!("[ChatAPI/History] 📡 拉取历史消息 contactId={}", contact_id);
        debug!("[ChatAPI/History]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .get(&url)
            .header("operationID", &operation_id)
            .send()
            .await?;
        // data 为 null 时视为空历史
        let messages = handle_http_response::<Vec<Message>>(response, "拉取历史消息")
            .await?
            .data
            .unwrap_or_default();
        info!("[ChatAPI/History] 📥 收到 {} 条历史消息", messages.len());
        Ok(messages)
    }

    async fn get_contact_detail(
        &self,
        user_id: UserId,
        contact_id: UserId,
    ) -> Result<ContactDetail, FetchError> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url(&format!(
            "/api/contact_list_detail/{}/{}",
            user_id, contact_id
        ));
        debug!("[ChatAPI/Detail] 📡 拉取联系人信息 URL: {}", url);

        let response = self
            .client
            .get(&url)
            .header("operationID", &operation_id)
            .send()
            .await?;
        handle_http_response::<ContactDetail>(response, "拉取联系人信息")
            .await?
            .into_data()
    }

    async fn get_contacts(&self) -> Result<Vec<ContactSnapshot>, FetchError> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url("/api/get_contacts");
        debug!("[ChatAPI/Contacts] 📡 拉取联系人列表 URL: {}", url);

        let response = self
            .client
            .get(&url)
            .header("operationID", &operation_id)
            .send()
            .await?;
        Ok(
            handle_http_response::<Vec<ContactSnapshot>>(response, "拉取联系人列表")
                .await?
                .data
                .unwrap_or_default(),
        )
    }

    async fn send_message(
        &self,
        contact_id: UserId,
        text: Option<&str>,
        attachments: &[OutgoingAttachment],
    ) -> Result<Message, FetchError> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url("/api/send_message");

        let mut form = Form::new()
            .text("contactId", contact_id.to_string())
            .text("message", text.unwrap_or_default().to_string());
        for attachment in attachments {
            let part = Part::bytes(attachment.bytes.clone())
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.mime)?;
            form = form.part("attachments", part);
        }

        info!(
            "[ChatAPI/Send] 📤 发送消息 contactId={}, 附件数: {}",
            contact_id,
            attachments.len()
        );
        let response = self
            .client
            .post(&url)
            .header("operationID", &operation_id)
            .multipart(form)
            .send()
            .await?;
        handle_http_response::<Message>(response, "发送消息")
            .await?
            .into_data()
    }
}
