//! metadata.properties の読み書き
//!
//! 形式:
//! ```text
//! # Metadata for <messageId>
//! key=value
//! ```
//! - キーはソート順で出力する（同じヘッダーなら同じバイト列になる）
//! - `\`、改行、タブ、キー中の `=` `:` はバックスラッシュでエスケープ
//! - `#` / `!` で始まる行と空行はコメントとして読み飛ばす

use crate::domain::Headers;

/// 行頭・区切り後で読み飛ばす空白（Unicode の空白は値の一部として残す）
const BLANKS: [char; 3] = [' ', '\t', '\x0c'];

/// ヘッダーを properties 形式のテキストに変換
pub fn encode(message_id: &str, headers: &Headers) -> String {
    let mut out = format!("# Metadata for {}\n", escape(message_id, false));
    for (key, value) in headers {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

/// properties 形式のテキストからヘッダーを復元
pub fn decode(text: &str) -> Headers {
    let mut headers = Headers::new();
    for line in text.lines() {
        let line = line.trim_start_matches(BLANKS);
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match find_separator(line) {
            Some(at) => (&line[..at], line[at + 1..].trim_start_matches(BLANKS)),
            None => (line, ""),
        };
        headers.insert(unescape(key), unescape(value));
    }
    headers
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(c);
            }
            '#' | '!' if is_key && i == 0 => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// エスケープされていない最初の `=` か `:` のバイト位置
fn find_separator(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (at, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return Some(at),
            _ => {}
        }
    }
    None
}
