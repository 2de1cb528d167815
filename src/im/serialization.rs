//! 宽松的 serde 辅助函数
//!
//! 服务器字段类型并不稳定（附件有时是 JSON 字符串，有时是数组；
//! 开关字段可能是 0/1 也可能是布尔值），在反序列化边界统一成强类型。

use crate::im::message::models::Attachment;
use serde::{Deserialize, Deserializer};

/// 反序列化可能为 null 的字段，null 或缺失时使用默认值
pub(crate) fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let opt = Option::<T>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 附件字段：数组、JSON 编码的字符串或 null
///
/// 字符串内容无法解析时返回错误，而不是静默地当作空列表
pub(crate) fn deserialize_attachments<'de, D>(deserializer: D) -> Result<Vec<Attachment>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAttachments {
        List(Vec<Attachment>),
        Encoded(String),
    }

    match Option::<RawAttachments>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(RawAttachments::List(list)) => Ok(list),
        Some(RawAttachments::Encoded(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Vec::new());
            }
            let parsed: Option<Vec<Attachment>> = serde_json::from_str(trimmed)
                .map_err(|e| serde::de::Error::custom(format!("附件字段格式错误: {e}")))?;
            Ok(parsed.unwrap_or_default())
        }
    }
}

/// 开关字段：`true/false`、`0/1` 或 `"0"/"1"`
pub(crate) fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Option::<RawFlag>::deserialize(deserializer)? {
        None => false,
        Some(RawFlag::Bool(b)) => b,
        Some(RawFlag::Int(n)) => n != 0,
        Some(RawFlag::Text(s)) => matches!(s.trim(), "1" | "true"),
    })
}

/// 计数字段：数字或数字字符串，无法解析时按 0 处理
pub(crate) fn deserialize_counter<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCounter {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<RawCounter>::deserialize(deserializer)? {
        None => 0,
        Some(RawCounter::Int(n)) => n.clamp(0, u32::MAX as i64) as u32,
        Some(RawCounter::Float(f)) if f.is_finite() && f > 0.0 => f as u32,
        Some(RawCounter::Float(_)) => 0,
        Some(RawCounter::Text(s)) => s.trim().parse().unwrap_or(0),
    })
}
