//! RouteMatcher - HTTP メソッドとパスからエンドポイントを判定する
//!
//! # 判定方法
//! - Exact: パスの完全一致（メソッドは問わない）
//! - Prefix: `^<prefix>(.*)$` の正規表現 + 指定メソッド。末尾を messageId として取り出す

use std::collections::HashMap;

use axum::http::Method;
use regex::Regex;

pub const MESSAGE_ID_FIELD: &str = "messageId";

/// RouteMatch はリクエスト単位の判定結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    pub matched: bool,
    pub fields: HashMap<String, String>,
}

impl RouteMatch {
    pub fn miss() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.field(MESSAGE_ID_FIELD)
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Prefix { regex: Regex, method: Method },
}

#[derive(Debug, Clone)]
pub struct RouteMatcher {
    name: String,
    pattern: Pattern,
}

impl RouteMatcher {
    /// パスの完全一致で判定する
    pub fn exact(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: Pattern::Exact(path.into()),
        }
    }

    /// prefix + メソッドで判定し、残りを messageId として取り出す
    pub fn prefix(name: impl Into<String>, prefix: &str, method: Method) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^{}(.*)$", regex::escape(prefix)))?;
        Ok(Self {
            name: name.into(),
            pattern: Pattern::Prefix { regex, method },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, method: &str, path: &str) -> RouteMatch {
        // クエリ文字列は判定に含めない
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        match &self.pattern {
            Pattern::Exact(expected) => RouteMatch {
                matched: path == expected,
                fields: HashMap::new(),
            },
            Pattern::Prefix { regex, method: expected } => {
                if !method.eq_ignore_ascii_case(expected.as_str()) {
                    return RouteMatch::miss();
                }
                let Some(id) = regex
                    .captures(path)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str())
                    .filter(|id| !id.is_empty())
                else {
                    return RouteMatch::miss();
                };
                RouteMatch {
                    matched: true,
                    fields: HashMap::from([(MESSAGE_ID_FIELD.to_string(), id.to_string())]),
                }
            }
        }
    }
}
