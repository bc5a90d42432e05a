//! HTTP API 客户端 - 会话鉴权、JSON 编解码、错误映射

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DataError, DataResult, MailboxSdkError, NetworkError, ProtonError, RemoteError, Result};
use crate::model::UserId;

/// HTTP 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
            user_agent: Some(format!("mailbox-sdk/{}", crate::version::SDK_VERSION)),
        }
    }
}

/// 登录后拿到的会话凭据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_uid: String,
    pub access_token: String,
}

/// 错误响应体 `{Code, Error}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: i32,
    #[serde(rename = "Error", default)]
    error: Option<String>,
}

/// 把非 2xx 响应映射为 DataError：
/// 400 / 422 且带业务码的响应映射为 Proton 错误，其余按状态码分类
pub fn map_error_response(status: u16, body: &str) -> DataError {
    if matches!(status, 400 | 422) {
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
            return DataError::Remote(RemoteError::Proton {
                error: ProtonError::from_code(parsed.code),
                api_message: parsed.error,
            });
        }
    }
    DataError::http(NetworkError::from_status(status))
}

#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl ApiClient {
    pub fn new(base_url: &str, config: &HttpClientConfig) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| MailboxSdkError::Config(format!("无效的 API 基础 URL {}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(MailboxSdkError::Config(format!("无效的 API 基础 URL: {}", base_url)));
        }

        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }

        let client = builder
            .build()
            .map_err(|e| MailboxSdkError::Http(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ HTTP 客户端已创建 (base_url: {})", base_url);

        Ok(Self {
            client,
            base_url: parsed,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn set_session(&self, user_id: &UserId, session: Session) {
        self.sessions.write().insert(user_id.clone(), session);
    }

    pub fn remove_session(&self, user_id: &UserId) {
        self.sessions.write().remove(user_id);
    }

    pub fn has_session(&self, user_id: &UserId) -> bool {
        self.sessions.read().contains_key(user_id)
    }

    /// 基础 URL 追加路径段；每段单独百分号编码，ID 中的 `/`、`?`、`#` 不会改变路径
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MailboxSdkError::Config(format!("无效的 API 基础 URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, user_id: &UserId, method: Method, path: &[&str]) -> DataResult<RequestBuilder> {
        let session = self
            .sessions
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| {
                warn!("⚠️ 用户无会话: {}", user_id);
                DataError::http(NetworkError::Unauthorized)
            })?;
        let url = self.url(path)?;
        Ok(self
            .client
            .request(method, url)
            .header("x-pm-uid", session.session_uid)
            .bearer_auth(session.access_token))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        user_id: &UserId,
        path: &[&str],
        query: &[(&str, String)],
    ) -> DataResult<T> {
        debug!("GET {} query={:?}", path.join("/"), query);
        let response = self
            .request(user_id, Method::GET, path)?
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        user_id: &UserId,
        path: &[&str],
        body: &B,
    ) -> DataResult<T> {
        debug!("PUT {}", path.join("/"));
        let response = self
            .request(user_id, Method::PUT, path)?
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> DataResult<T> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(|e| {
                warn!("⚠️ 响应解析失败: {}", e);
                DataError::http(NetworkError::Parse)
            });
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            warn!("⚠️ 会话已失效: {}", status);
        } else {
            debug!("请求失败: status={}, body={}", status, body);
        }
        Err(map_error_response(status.as_u16(), &body))
    }
}
