//! 响应值类型与装配。
//!
//! [`Response`] 是经过校验的不可变值：状态码限定在 [100, 599]，
//! 原因短语取自线上字节，消息体要么缺席、要么是原始字节、要么是
//! 自动解码出的 JSON 结构值。
//!
//! 装配发生在响应流结束之后：若自动 JSON 解析开启、`Content-Type`
//! 的 type/subtype 恰为 `application/json` 且 `charset` 参数（小写，
//! 默认 `utf8`）属于已识别的编码集合，则按该字符集解码字节并做 JSON
//! 解析；解析失败以 `ResponseBodyNotJson` 走拆除路径。其余情况一律
//! 保留原始字节。

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::encoding::Encoding;
use crate::error::{Error, Kind};
use crate::headers;
use crate::proto::ResponseHead;

/// 一次已完成请求的响应。
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
    body: Option<ResponseBody>,
}

/// 响应的消息体。
#[derive(Clone, Debug)]
pub enum ResponseBody {
    /// 原始字节
    Bytes(Bytes),
    /// 自动解码出的 JSON 结构值
    Json(Value),
}

impl Response {
    /// 构造一个响应值，校验状态码在 [100, 599] 区间内。
    pub fn new(
        status: u16,
        reason: impl Into<String>,
        headers: HeaderMap,
        body: Option<ResponseBody>,
    ) -> Result<Response, Error> {
        if !(100..=599).contains(&status) {
            return Err(Error::new(Kind::StatusCodeInvalid)
                .with(format!("status code {} out of range", status)));
        }
        let status = StatusCode::from_u16(status)
            .expect("status inside the validated range");
        Ok(Response {
            status,
            reason: reason.into(),
            headers,
            body,
        })
    }

    /// 响应状态码。
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// 状态码的数值形式。
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// 线上的原因短语（如 `OK`、`No Content`）。
    pub fn status_message(&self) -> &str {
        &self.reason
    }

    /// 响应头集合。
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 响应体，缺席时为 `None`。
    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    /// 原始字节形式的响应体，仅当消息体未被 JSON 解码时存在。
    pub fn bytes(&self) -> Option<&Bytes> {
        match self.body {
            Some(ResponseBody::Bytes(ref b)) => Some(b),
            _ => None,
        }
    }

    /// JSON 形式的响应体，仅当自动解码生效时存在。
    pub fn json(&self) -> Option<&Value> {
        match self.body {
            Some(ResponseBody::Json(ref v)) => Some(v),
            _ => None,
        }
    }
}

/// 流结束后把头部与累积的消息体装配为响应值。
pub(crate) fn assemble(head: ResponseHead, body: Bytes, auto_json: bool) -> Result<Response, Error> {
    let decodable = if auto_json {
        is_decodable_json(&head.headers)
    } else {
        None
    };
    let body = if body.is_empty() {
        None
    } else if let Some(encoding) = decodable {
        let text = encoding.decode(&body);
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::new(Kind::ResponseBodyNotJson).with(e))?;
        Some(ResponseBody::Json(value))
    } else {
        Some(ResponseBody::Bytes(body))
    };
    Response::new(head.status, head.reason, head.headers, body)
}

/// 自动 JSON 解码是否适用；适用时返回字符集。
///
/// 需要 `Content-Type` 解析成功、本质为 `application/json`，且
/// charset 参数（默认 `utf8`）在编码集合内。
fn is_decodable_json(headers: &HeaderMap) -> Option<Encoding> {
    let media = headers::content_type_parse(headers)?;
    if !media.is_json() {
        return None;
    }
    match media.charset {
        Some(charset) => charset.parse::<Encoding>().ok(),
        None => Some(Encoding::Utf8),
    }
}
