//! 分享内容（附件 URI、主题、收件人、正文）的编码
//!
//! 每个字符串都用 URL-safe、无填充的 base64 编码，结果不含 '/'，可安全放入路由参数或请求头。
//! `encoded` 标记保证重复编码 / 解码不会叠加。

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{MailboxSdkError, Result};

fn encode_str(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(value.as_bytes())
}

fn decode_str(value: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| MailboxSdkError::Serialization(format!("base64 解码失败: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| MailboxSdkError::Serialization(format!("非法 UTF-8: {}", e)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentShareInfo {
    pub attachment_uris: Vec<String>,
    pub email_subject: Option<String>,
    pub email_recipient_to: Vec<String>,
    pub email_recipient_cc: Vec<String>,
    pub email_recipient_bcc: Vec<String>,
    pub email_body: Option<String>,
    #[serde(default)]
    pub encoded: bool,
}

impl IntentShareInfo {
    pub fn is_empty(&self) -> bool {
        self.attachment_uris.is_empty()
            && self.email_subject.is_none()
            && self.email_recipient_to.is_empty()
            && self.email_recipient_cc.is_empty()
            && self.email_recipient_bcc.is_empty()
            && self.email_body.is_none()
    }

    pub fn encode(&self) -> Self {
        if self.encoded {
            return self.clone();
        }
        let list = |values: &[String]| values.iter().map(|v| encode_str(v)).collect::<Vec<_>>();
        Self {
            attachment_uris: list(&self.attachment_uris),
            email_subject: self.email_subject.as_deref().map(encode_str),
            email_recipient_to: list(&self.email_recipient_to),
            email_recipient_cc: list(&self.email_recipient_cc),
            email_recipient_bcc: list(&self.email_recipient_bcc),
            email_body: self.email_body.as_deref().map(encode_str),
            encoded: true,
        }
    }

    pub fn decode(&self) -> Result<Self> {
        if !self.encoded {
            return Ok(self.clone());
        }
        let list = |values: &[String]| values.iter().map(|v| decode_str(v)).collect::<Result<Vec<_>>>();
        Ok(Self {
            attachment_uris: list(&self.attachment_uris)?,
            email_subject: self.email_subject.as_deref().map(decode_str).transpose()?,
            email_recipient_to: list(&self.email_recipient_to)?,
            email_recipient_cc: list(&self.email_recipient_cc)?,
            email_recipient_bcc: list(&self.email_recipient_bcc)?,
            email_body: self.email_body.as_deref().map(decode_str).transpose()?,
            encoded: false,
        })
    }
}

/// 键和值都编码
pub fn encode_header_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter().map(|(k, v)| (encode_str(k), encode_str(v))).collect()
}

pub fn decode_header_map(map: &HashMap<String, String>) -> Result<HashMap<String, String>> {
    map.iter()
        .map(|(k, v)| Ok((decode_str(k)?, decode_str(v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IntentShareInfo {
        IntentShareInfo {
            attachment_uris: vec!["content://media/external/images/1?x=a/b".to_string()],
            email_subject: Some("周报 / weekly ✅".to_string()),
            email_recipient_to: vec!["a@pm.me".to_string(), "b@pm.me".to_string()],
            email_recipient_cc: vec![],
            email_recipient_bcc: vec!["ü@example.com".to_string()],
            email_body: Some("x".repeat(4096)),
            encoded: false,
        }
    }

    #[test]
    fn encode_then_decode_restores_value() {
        let info = sample();
        let encoded = info.encode();
        assert!(encoded.encoded);
        assert!(!encoded.email_subject.as_deref().unwrap().contains('/'));
        assert!(encoded.attachment_uris.iter().all(|uri| !uri.contains('/')));
        assert_eq!(encoded.decode().unwrap(), info);
        println!("✅ 分享信息编码往返");
    }

    #[test]
    fn encode_and_decode_are_idempotent() {
        let info = sample();
        let encoded = info.encode();
        assert_eq!(encoded.encode(), encoded);
        assert_eq!(info.decode().unwrap(), info);
    }

    #[test]
    fn empty_info() {
        assert!(IntentShareInfo::default().is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn header_map_round_trip() {
        let mut headers = HashMap::new();
        headers.insert("X-Subject/Path".to_string(), "héllo / 世界".to_string());
        let encoded = encode_header_map(&headers);
        assert!(encoded.iter().all(|(k, v)| !k.contains('/') && !v.contains('/')));
        assert_eq!(decode_header_map(&encoded).unwrap(), headers);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let broken = IntentShareInfo {
            email_subject: Some("***".to_string()),
            encoded: true,
            ..Default::default()
        };
        assert!(broken.decode().is_err());
    }
}
