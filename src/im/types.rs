use crate::im::error::FetchError;
use serde::Deserialize;
use tracing::{debug, error, info};

/// 用户 ID（服务器分配的正整数）
pub type UserId = u64;

/// 消息 ID（服务器分配，会话内唯一，按插入顺序递增但不保证连续）
pub type MessageId = u64;

/// 统一的 API 响应包装结构体（包含 status、message、data）
///
/// 服务器在失败时返回 `status: false`，成功时 status 可能缺失；
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 取出 data 字段，缺失时返回 `FetchError::MissingData`
    pub fn into_data(self) -> Result<T, FetchError> {
        self.data.ok_or(FetchError::MissingData)
    }
}

/// 通用 HTTP 响应处理函数：直接反序列化为统一的响应结构体
/// 所有 API 都共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<ApiResponse<T>, FetchError> {
    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(FetchError::Status {
            status: status.as_u16(),
            body: body_str.into_owned(),
        });
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        FetchError::Decode(e)
    })?;

    if api_resp.status == Some(false) {
        let msg = api_resp
            .message
            .clone()
            .unwrap_or_else(|| "未知错误".to_string());
        error!("[HTTP] {}服务器错误: {}", operation_name, msg);
        return Err(FetchError::Server(msg));
    }

    info!("[HTTP] ✅ {}完成", operation_name);
    Ok(api_resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_missing_data_is_an_error() {
        let resp: ApiResponse<Vec<u64>> = serde_json::from_str(r#"{"status": true}"#).unwrap();
        assert!(matches!(resp.into_data(), Err(FetchError::MissingData)));
    }

    #[test]
    fn api_response_null_data_is_none() {
        let resp: ApiResponse<Vec<u64>> =
            serde_json::from_str(r#"{"data": null, "message": "ok"}"#).unwrap();
        assert!(resp.data.is_none());
        assert_eq!(resp.message.as_deref(), Some("ok"));
    }
}
