//! 头部工具函数与 `Content-Type` 的小语法解析。
//!
//! 响应装配只需要 `type/subtype (; key=value)*` 这一小块媒体类型语法，
//! 足够判定 `application/json` 与提取 `charset` 参数，因此在这里内联
//! 实现，不引入第三方媒体类型解析库。

use http::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};

/// 解析响应的 `Content-Length`。
///
/// 多个同名头必须取值一致，否则整体视为无效（返回 `None`）。
pub(crate) fn content_length_parse(headers: &HeaderMap) -> Option<u64> {
    let mut folded = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = from_digits(value.as_bytes())?;
        match folded {
            None => folded = Some(parsed),
            Some(prev) if prev == parsed => (),
            Some(_) => return None,
        }
    }
    folded
}

/// 严格的十进制解析：只接受 ASCII 数字，拒绝符号、空白与空串。
fn from_digits(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut result = 0u64;
    for &b in bytes {
        match b {
            b'0'..=b'9' => {
                result = result.checked_mul(10)?.checked_add((b - b'0') as u64)?;
            }
            _ => return None,
        }
    }
    Some(result)
}

/// 响应是否声明了 `Transfer-Encoding: chunked`。
///
/// 按规范只认最后一个传输编码是 `chunked` 的情况。
pub(crate) fn transfer_encoding_is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .last()
        .map(is_chunked_value)
        .unwrap_or(false)
}

fn is_chunked_value(value: &HeaderValue) -> bool {
    value
        .to_str()
        .ok()
        .and_then(|s| s.split(',').next_back())
        .map(|last| last.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

/// 解析后的媒体类型：`type/subtype` 与可选的 `charset` 参数。
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MediaType {
    type_: String,
    subtype: String,
    /// `charset` 参数，已去引号并转小写
    pub(crate) charset: Option<String>,
}

impl MediaType {
    pub(crate) fn is_json(&self) -> bool {
        self.type_ == "application" && self.subtype == "json"
    }
}

/// 解析响应的 `Content-Type` 头。
///
/// 语法不合法（缺斜线、空 token、非 UTF-8 值）时返回 `None`，
/// 调用方将其视同"不是 JSON"。
pub(crate) fn content_type_parse(headers: &HeaderMap) -> Option<MediaType> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mut parts = value.split(';');

    let essence = parts.next()?.trim();
    let (type_, subtype) = essence.split_once('/')?;
    if type_.is_empty() || subtype.is_empty() {
        return None;
    }

    let mut charset = None;
    for param in parts {
        if let Some((key, raw)) = param.split_once('=') {
            if key.trim().eq_ignore_ascii_case("charset") {
                let trimmed = raw.trim().trim_matches('"');
                charset = Some(trimmed.to_ascii_lowercase());
            }
        }
    }

    Some(MediaType {
        type_: type_.trim().to_ascii_lowercase(),
        subtype: subtype.trim().to_ascii_lowercase(),
        charset,
    })
}
