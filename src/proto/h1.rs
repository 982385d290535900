//! HTTP/1.1 编解码：请求头序列化、响应头解析、消息体分帧解码。
//!
//! 解析建立在 `httparse` 之上，分帧解码是一个跨多次读取增量推进的
//! 小状态机，覆盖 `Content-Length`、`Transfer-Encoding: chunked` 与
//! 连接关闭分隔三种模式。请求侧总是携带 `Connection: close`——
//! 实例是一次性的，不做连接复用。

use bytes::{Buf, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use http::Method;

use crate::config::Config;
use crate::error::{Error, Kind};
use crate::headers;

/// 响应头部允许的最大字节数，超过则放弃解析。
const MAX_HEAD_SIZE: usize = 400 * 1024;
/// 单次解析接受的最大头部数量。
const MAX_HEADERS: usize = 100;
/// chunk 尺寸行的长度上限。
const CHUNK_SIZE_LINE_MAX: usize = 4096;

/// 已解析的响应头：状态码、原因短语与头部集合。
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub(crate) status: u16,
    pub(crate) reason: String,
    pub(crate) headers: HeaderMap,
}

/// 把请求行与头部序列化进输出缓冲。
///
/// - `Host` 缺省时从 URI 的 authority 补全；
/// - 用户头部按插入顺序原样写出；
/// - 有请求体且用户未显式给出 `Content-Length` 时由编码器补上精确值；
/// - `Connection` 缺省时补 `close`。
pub(crate) fn encode_head(cfg: &Config, body_len: Option<u64>, dst: &mut BytesMut) {
    let path = cfg
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    dst.reserve(64 + path.len());
    dst.extend_from_slice(cfg.method.as_str().as_bytes());
    dst.extend_from_slice(b" ");
    dst.extend_from_slice(path.as_bytes());
    dst.extend_from_slice(b" HTTP/1.1\r\n");

    if !cfg.headers.contains_key(HOST) {
        let authority = cfg
            .uri
            .authority()
            .expect("config always has an authority")
            .as_str();
        dst.extend_from_slice(b"host: ");
        dst.extend_from_slice(authority.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }

    for (name, value) in cfg.headers.iter() {
        dst.extend_from_slice(name.as_str().as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }

    if let Some(len) = body_len {
        if !cfg.headers.contains_key(CONTENT_LENGTH) {
            let mut fmt = itoa::Buffer::new();
            dst.extend_from_slice(b"content-length: ");
            dst.extend_from_slice(fmt.format(len).as_bytes());
            dst.extend_from_slice(b"\r\n");
        }
    }

    if !cfg.headers.contains_key(CONNECTION) {
        dst.extend_from_slice(b"connection: close\r\n");
    }

    dst.extend_from_slice(b"\r\n");
}

/// 尝试从读缓冲中解析一个完整的响应头。
///
/// 数据不足返回 `Ok(None)`；解析成功时把头部字节从缓冲中移除，
/// 剩余字节属于消息体。
pub(crate) fn parse_head(buf: &mut BytesMut) -> Result<Option<ResponseHead>, Error> {
    let (head, len) = {
        let mut parsed = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut res = httparse::Response::new(&mut parsed);
        match res.parse(buf.as_ref()) {
            Ok(httparse::Status::Complete(len)) => {
                let status = res.code.expect("complete response has a code");
                let reason = res.reason.unwrap_or("").to_owned();
                let mut headers = HeaderMap::with_capacity(res.headers.len());
                for h in res.headers.iter() {
                    let name = HeaderName::from_bytes(h.name.as_bytes())
                        .map_err(|e| Error::new(Kind::Protocol).with(e))?;
                    let value = HeaderValue::from_bytes(h.value)
                        .map_err(|e| Error::new(Kind::Protocol).with(e))?;
                    headers.append(name, value);
                }
                (
                    ResponseHead {
                        status,
                        reason,
                        headers,
                    },
                    len,
                )
            }
            Ok(httparse::Status::Partial) => {
                if buf.len() >= MAX_HEAD_SIZE {
                    return Err(Error::new(Kind::Protocol).with("response head too large"));
                }
                return Ok(None);
            }
            Err(e) => return Err(Error::new(Kind::Protocol).with(e)),
        }
    };
    buf.advance(len);
    trace!("parsed response head: {} {}", head.status, head.reason);
    Ok(Some(head))
}

/// 响应体分帧解码器。
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoder {
    /// 无消息体（HEAD 请求、204、304）
    Empty,
    /// `Content-Length` 分帧，值为剩余字节数
    Length(u64),
    /// `Transfer-Encoding: chunked` 分帧
    Chunked(ChunkedState),
    /// 连接关闭分隔
    Eof,
}

/// chunked 解码的中间状态。
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkedState {
    /// 等待 chunk 尺寸行
    Size,
    /// 读取 chunk 数据，值为剩余字节数
    Data(u64),
    /// 等待 chunk 末尾的 CRLF
    DataEnd,
    /// 末 chunk 之后，跳过 trailer 直到空行
    Trailer,
}

impl Decoder {
    /// 按方法、状态码与头部决定分帧模式。
    pub(crate) fn detect(
        method: &Method,
        status: u16,
        headers: &HeaderMap,
    ) -> Result<Decoder, Error> {
        if method == Method::HEAD || status == 204 || status == 304 {
            return Ok(Decoder::Empty);
        }
        if headers::transfer_encoding_is_chunked(headers) {
            return Ok(Decoder::Chunked(ChunkedState::Size));
        }
        if headers.contains_key(CONTENT_LENGTH) {
            return match headers::content_length_parse(headers) {
                Some(len) => Ok(Decoder::Length(len)),
                None => Err(Error::new(Kind::Protocol).with("invalid content-length")),
            };
        }
        Ok(Decoder::Eof)
    }

    /// 消费读缓冲中的可用字节，把解码后的消息体追加到 `out`。
    ///
    /// 返回 `Ok(true)` 表示消息体完整；`Ok(false)` 需要更多数据。
    pub(crate) fn decode(&mut self, input: &mut BytesMut, out: &mut BytesMut) -> Result<bool, Error> {
        match self {
            Decoder::Empty => Ok(true),
            Decoder::Length(rem) => {
                let take = std::cmp::min(*rem, input.len() as u64) as usize;
                out.extend_from_slice(&input[..take]);
                input.advance(take);
                *rem -= take as u64;
                Ok(*rem == 0)
            }
            Decoder::Eof => {
                let len = input.len();
                out.extend_from_slice(&input[..]);
                input.advance(len);
                Ok(false)
            }
            Decoder::Chunked(state) => decode_chunked(state, input, out),
        }
    }

    /// 流结束时裁决：关闭分隔模式下 EOF 即消息完整；
    /// 其余模式的提前 EOF 视同对端在消息完成前关闭连接。
    pub(crate) fn on_eof(&self) -> Result<(), Error> {
        match self {
            Decoder::Eof | Decoder::Empty | Decoder::Length(0) => Ok(()),
            _ => Err(Error::new(Kind::ConnectionReset)
                .with("connection closed before message completed")),
        }
    }
}

fn decode_chunked(
    state: &mut ChunkedState,
    input: &mut BytesMut,
    out: &mut BytesMut,
) -> Result<bool, Error> {
    loop {
        match *state {
            ChunkedState::Size => {
                let line_end = match find_crlf(input) {
                    Some(pos) => pos,
                    None => {
                        if input.len() > CHUNK_SIZE_LINE_MAX {
                            return Err(Error::new(Kind::Protocol).with("chunk size line too long"));
                        }
                        return Ok(false);
                    }
                };
                let text = std::str::from_utf8(&input[..line_end])
                    .map_err(|e| Error::new(Kind::Protocol).with(e))?;
                // Chunk extensions (";key=value") are tolerated and dropped.
                let size_hex = text.split(';').next().unwrap_or("").trim();
                let size = u64::from_str_radix(size_hex, 16)
                    .map_err(|e| Error::new(Kind::Protocol).with(e))?;
                input.advance(line_end + 2);
                *state = if size == 0 {
                    ChunkedState::Trailer
                } else {
                    ChunkedState::Data(size)
                };
            }
            ChunkedState::Data(ref mut rem) => {
                if input.is_empty() {
                    return Ok(false);
                }
                let take = std::cmp::min(*rem, input.len() as u64) as usize;
                out.extend_from_slice(&input[..take]);
                input.advance(take);
                *rem -= take as u64;
                if *rem == 0 {
                    *state = ChunkedState::DataEnd;
                } else {
                    return Ok(false);
                }
            }
            ChunkedState::DataEnd => {
                if input.len() < 2 {
                    return Ok(false);
                }
                if &input[..2] != b"\r\n" {
                    return Err(Error::new(Kind::Protocol).with("missing chunk terminator"));
                }
                input.advance(2);
                *state = ChunkedState::Size;
            }
            ChunkedState::Trailer => {
                let line_end = match find_crlf(input) {
                    Some(pos) => pos,
                    None => return Ok(false),
                };
                let done = line_end == 0;
                input.advance(line_end + 2);
                if done {
                    return Ok(true);
                }
                // ignore the trailer field and keep scanning
            }
        }
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}
