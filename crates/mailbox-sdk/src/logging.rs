//! 日志初始化 - tracing-subscriber fmt + EnvFilter

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 过滤表达式，如 "info" 或 "mailbox_sdk=debug,info"
    pub level: String,
    /// 终端彩色输出
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// 安装全局 subscriber。已安装时返回 false，不会 panic。
///
/// `RUST_LOG` 优先于配置中的 level。
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        let config = LoggingConfig {
            level: "debug".into(),
            ansi: false,
        };
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
