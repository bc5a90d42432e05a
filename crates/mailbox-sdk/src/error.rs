use std::fmt;

use thiserror::Error;

/// SDK 基础设施错误（存储、配置、序列化等）
#[derive(Debug)]
pub enum MailboxSdkError {
    SqliteError(rusqlite::Error),
    JsonError(String),
    InvalidArgument(String),
    NotFound(String),
    KvStore(String),
    Serialization(String),
    IO(String),
    Database(String),
    Migration(String),
    Http(String),
    Config(String),
    NotInitialized(String),
    ShuttingDown(String),
    /// 领域层错误（本地 / 远端）
    Data(DataError),
    Other(String),
}

impl fmt::Display for MailboxSdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxSdkError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            MailboxSdkError::JsonError(e) => write!(f, "JSON error: {}", e),
            MailboxSdkError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            MailboxSdkError::NotFound(e) => write!(f, "Not found: {}", e),
            MailboxSdkError::KvStore(e) => write!(f, "KV store error: {}", e),
            MailboxSdkError::Serialization(e) => write!(f, "Serialization error: {}", e),
            MailboxSdkError::IO(e) => write!(f, "IO error: {}", e),
            MailboxSdkError::Database(e) => write!(f, "Database error: {}", e),
            MailboxSdkError::Migration(e) => write!(f, "Migration error: {}", e),
            MailboxSdkError::Http(e) => write!(f, "HTTP error: {}", e),
            MailboxSdkError::Config(e) => write!(f, "Config error: {}", e),
            MailboxSdkError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            MailboxSdkError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
            MailboxSdkError::Data(e) => write!(f, "Data error: {}", e),
            MailboxSdkError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for MailboxSdkError {}

impl From<rusqlite::Error> for MailboxSdkError {
    fn from(error: rusqlite::Error) -> Self {
        MailboxSdkError::SqliteError(error)
    }
}

impl From<serde_json::Error> for MailboxSdkError {
    fn from(error: serde_json::Error) -> Self {
        MailboxSdkError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for MailboxSdkError {
    fn from(error: std::io::Error) -> Self {
        MailboxSdkError::IO(error.to_string())
    }
}

impl From<sled::Error> for MailboxSdkError {
    fn from(error: sled::Error) -> Self {
        MailboxSdkError::KvStore(error.to_string())
    }
}

impl From<refinery::Error> for MailboxSdkError {
    fn from(error: refinery::Error) -> Self {
        MailboxSdkError::Migration(error.to_string())
    }
}

impl From<reqwest::Error> for MailboxSdkError {
    fn from(error: reqwest::Error) -> Self {
        MailboxSdkError::Http(error.to_string())
    }
}

impl From<DataError> for MailboxSdkError {
    fn from(error: DataError) -> Self {
        MailboxSdkError::Data(error)
    }
}

pub type Result<T> = std::result::Result<T, MailboxSdkError>;

/// 仓库 / 数据源层统一返回类型
pub type DataResult<T> = std::result::Result<T, DataError>;

/// 数据层错误分类：本地缓存错误或远端错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("local: {0}")]
    Local(LocalError),
    #[error("remote: {0}")]
    Remote(RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalError {
    #[error("no data cached")]
    NoDataCached,
    #[error("upserting failed")]
    UpsertingFailed,
    #[error("deleting failed")]
    DeletingFailed,
    #[error("unknown local error: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("http: {0:?}")]
    Http(NetworkError),
    #[error("proton api error {error:?}: {api_message:?}")]
    Proton {
        error: ProtonError,
        api_message: Option<String>,
    },
    #[error("unknown remote error: {0}")]
    Unknown(String),
}

/// 网络层错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkError {
    NoNetwork,
    Unreachable,
    ServerError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    Parse,
    Unknown,
}

impl NetworkError {
    /// HTTP 状态码映射
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => NetworkError::BadRequest,
            401 => NetworkError::Unauthorized,
            403 => NetworkError::Forbidden,
            404 => NetworkError::NotFound,
            500..=599 => NetworkError::ServerError,
            _ => NetworkError::Unknown,
        }
    }

    /// 连接类错误，稍后重试可能恢复
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            NetworkError::NoNetwork | NetworkError::Unreachable | NetworkError::ServerError
        )
    }
}

/// Proton API 业务错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtonError {
    InputInvalid,
    PayloadTooLarge,
    Unknown(i32),
}

impl ProtonError {
    pub fn from_code(code: i32) -> Self {
        match code {
            2001 => ProtonError::InputInvalid,
            2024 => ProtonError::PayloadTooLarge,
            other => ProtonError::Unknown(other),
        }
    }
}

impl DataError {
    pub fn no_data_cached() -> Self {
        DataError::Local(LocalError::NoDataCached)
    }

    pub fn http(error: NetworkError) -> Self {
        DataError::Remote(RemoteError::Http(error))
    }

    /// 仅当为 Remote.Http(NoNetwork) 时视为离线错误
    pub fn is_offline_error(&self) -> bool {
        matches!(self, DataError::Remote(RemoteError::Http(NetworkError::NoNetwork)))
    }

    pub fn is_input_invalid(&self) -> bool {
        matches!(
            self,
            DataError::Remote(RemoteError::Proton {
                error: ProtonError::InputInvalid,
                ..
            })
        )
    }

    /// 无法归类的错误，UI 按「意外错误」处理
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            DataError::Local(LocalError::Unknown(_))
                | DataError::Remote(RemoteError::Unknown(_))
                | DataError::Remote(RemoteError::Http(NetworkError::Unknown))
        )
    }
}

impl From<MailboxSdkError> for DataError {
    fn from(error: MailboxSdkError) -> Self {
        match error {
            MailboxSdkError::Data(e) => e,
            MailboxSdkError::Http(e) => DataError::Remote(RemoteError::Unknown(e)),
            other => DataError::Local(LocalError::Unknown(other.to_string())),
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(error: reqwest::Error) -> Self {
        let network = if error.is_connect() {
            NetworkError::NoNetwork
        } else if error.is_timeout() {
            NetworkError::Unreachable
        } else if error.is_decode() {
            NetworkError::Parse
        } else if let Some(status) = error.status() {
            NetworkError::from_status(status.as_u16())
        } else {
            NetworkError::Unknown
        };
        DataError::http(network)
    }
}
