//! 请求体表示与编码。
//!
//! 动态来源的请求体在构造期就收敛为一个带标签的变体：字节缓冲、
//! 带具名编码的文本、或 JSON 结构值。编码操作
//! `encode() -> (bytes, content_length)` 在驱动任务启动时运行，
//! 失败走拆除路径而不是构造路径。
//!
//! JSON 变体在构造时立即尝试序列化，但把 `Result` 存进变体里延迟暴露
//! ——不可序列化的值要等到 `perform()` 时才以
//! `BodyNotSerializable` 拒绝 promise（构造永远不因请求体失败）。

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::encoding::Encoding;
use crate::error::{Error, Kind};

/// 一次请求的出站消息体。
pub struct Body {
    kind: BodyKind,
}

enum BodyKind {
    /// 原始字节，直接透传
    Bytes(Bytes),
    /// 文本与其具名编码，编码期转为字节
    Text(String, Encoding),
    /// 已在构造时序列化的 JSON 结果；Err 延迟到编码期暴露
    Json(Result<Bytes, Error>),
}

impl Body {
    /// 原始字节体。
    pub fn bytes(bytes: impl Into<Bytes>) -> Body {
        Body {
            kind: BodyKind::Bytes(bytes.into()),
        }
    }

    /// 按具名编码转换的文本体。
    pub fn text(text: impl Into<String>, encoding: Encoding) -> Body {
        Body {
            kind: BodyKind::Text(text.into(), encoding),
        }
    }

    /// 序列化为 JSON 的结构值体。
    ///
    /// 序列化立即执行，但失败不在此处报告：编码期（`perform()` 内）
    /// 才以 `BodyNotSerializable` 失败。
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Body {
        let result = serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| Error::new(Kind::BodyNotSerializable).with(e));
        Body {
            kind: BodyKind::Json(result),
        }
    }

    /// 把请求体转为线上字节与隐含的 `Content-Length`。
    ///
    /// 编码器只负责 `Content-Length`；`Content-Type` 由调用方在头部里提供。
    pub(crate) fn encode(&self) -> Result<(Bytes, u64), Error> {
        let bytes = match self.kind {
            BodyKind::Bytes(ref b) => b.clone(),
            BodyKind::Text(ref text, encoding) => Bytes::from(encoding.encode(text)?),
            BodyKind::Json(ref result) => result.clone()?,
        };
        let len = bytes.len() as u64;
        Ok((bytes, len))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Body {
        Body::bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Body {
        Body::bytes(bytes)
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Body {
        Body::bytes(bytes)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Body {
        Body::text(text, Encoding::Utf8)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Body {
        Body::text(text.to_owned(), Encoding::Utf8)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Body {
        Body::json(&value)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BodyKind::Bytes(ref b) => f.debug_tuple("Body::Bytes").field(&b.len()).finish(),
            BodyKind::Text(ref t, enc) => f
                .debug_tuple("Body::Text")
                .field(&t.len())
                .field(&enc)
                .finish(),
            BodyKind::Json(ref r) => f
                .debug_tuple("Body::Json")
                .field(&r.as_ref().map(Bytes::len))
                .finish(),
        }
    }
}
