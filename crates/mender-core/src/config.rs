//! Config - 設定の読み込みと検証
//!
//! TOML から読み込み、省略された項目はデフォルト値で埋める。
//! 検証（validate）はコントローラーの prepare で行い、不正なら起動を中止する。

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::Method;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_REPORT_PATH: &str = "/api/failed/list";
pub const DEFAULT_RETRY_PATH: &str = "/api/retry/";
pub const DEFAULT_DELETE_PATH: &str = "/api/failed/delete/";
pub const DEFAULT_PIPELINE_HEADER: &str = "pipeline";
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MenderConfig {
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub report: ReportConfig,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// 失敗したメッセージを保存するルートディレクトリ
    pub base_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./failed"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub bind_addr: SocketAddr,
    pub report_path: String,
    pub retry_path: String,
    pub delete_path: String,
    pub retry_method: String,
    pub delete_method: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8089)),
            report_path: DEFAULT_REPORT_PATH.to_string(),
            retry_path: DEFAULT_RETRY_PATH.to_string(),
            delete_path: DEFAULT_DELETE_PATH.to_string(),
            retry_method: Method::POST.to_string(),
            delete_method: Method::DELETE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Names,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub format: ReportFormat,
    /// 省略時は format に応じたデフォルト
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// 再投入先のパイプライン id を持つヘッダー名
    pub pipeline_header: String,
    pub shutdown_grace_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            pipeline_header: DEFAULT_PIPELINE_HEADER.to_string(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

impl RetryConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// tracing の filter 指定（`RUST_LOG` / `MENDER_LOG` が優先）
    pub filter: Option<String>,
}

impl MenderConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 起動前の検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("http.report_path", &self.http.report_path),
            ("http.retry_path", &self.http.retry_path),
            ("http.delete_path", &self.http.delete_path),
        ];
        for (field, path) in paths {
            if !path.starts_with('/') {
                return Err(ConfigError::invalid(field, format!("'{path}' must start with '/'")));
            }
        }
        for (i, (field, path)) in paths.iter().enumerate() {
            if paths[..i].iter().any(|(_, other)| other == path) {
                return Err(ConfigError::invalid(field, format!("'{path}' is used twice")));
            }
        }

        self.http.retry_method()?;
        self.http.delete_method()?;

        if self.retry.pipeline_header.trim().is_empty() {
            return Err(ConfigError::invalid("retry.pipeline_header", "must not be empty"));
        }
        Ok(())
    }
}

impl HttpConfig {
    pub fn retry_method(&self) -> Result<Method, ConfigError> {
        parse_method("http.retry_method", &self.retry_method)
    }

    pub fn delete_method(&self) -> Result<Method, ConfigError> {
        parse_method("http.delete_method", &self.delete_method)
    }
}

fn parse_method(field: &'static str, value: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(value.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ConfigError::invalid(field, format!("'{value}' is not an HTTP method")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = MenderConfig::default();
        assert_eq!(config.http.report_path, "/api/failed/list");
        assert_eq!(config.http.retry_path, "/api/retry/");
        assert_eq!(config.http.delete_path, "/api/failed/delete/");
        assert_eq!(config.http.retry_method().unwrap(), Method::POST);
        assert_eq!(config.http.delete_method().unwrap(), Method::DELETE);
        assert_eq!(config.retry.shutdown_grace(), Duration::from_secs(30));
        assert_eq!(config.report.format, ReportFormat::Names);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = MenderConfig::from_toml_str(
            r#"
            [store]
            base_dir = "/var/lib/mender"

            [http]
            retry_method = "put"

            [report]
            format = "json"

            [log]
            filter = "warn,mender_core=info"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.base_dir, PathBuf::from("/var/lib/mender"));
        assert_eq!(config.http.retry_method().unwrap(), Method::PUT);
        assert_eq!(config.http.delete_path, DEFAULT_DELETE_PATH);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.retry.pipeline_header, "pipeline");
        assert_eq!(config.log.filter.as_deref(), Some("warn,mender_core=info"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = MenderConfig::from_toml_str("[http]\nretry_verb = \"POST\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_bad_paths_and_methods() {
        let mut config = MenderConfig::default();
        config.http.retry_path = "api/retry/".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "http.retry_path", .. })
        ));

        let mut config = MenderConfig::default();
        config.http.delete_path = config.http.retry_path.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "http.delete_path", .. })
        ));

        let mut config = MenderConfig::default();
        config.http.delete_method = "DE LETE".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "http.delete_method", .. })
        ));

        let mut config = MenderConfig::default();
        config.retry.pipeline_header = " ".to_string();
        assert!(config.validate().is_err());
    }
}
