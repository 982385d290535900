//! 请求体文本编码的封闭集合。
//!
//! 集合与别名折叠：`utf8`/`utf-8`、`utf16le`/`utf-16le`/`ucs2`/`ucs-2`、
//! `latin1`、`ascii`、`base64`、`base64url`、`hex`。
//!
//! 编码有两个方向：
//! - [`encode`](Encoding::encode)：把文本转为请求体字节。对文本型编码是
//!   字符集编码；对 `base64`/`base64url`/`hex` 则是把文本按该表示法
//!   *解码* 为字节（与 Node `Buffer.from(text, enc)` 的语义一致）。
//! - [`decode`](Encoding::decode)：把响应体字节转为文本，供 JSON 自动
//!   解析使用。文本型编码通过 `encoding_rs` 的标签查找完成（宽容解码，
//!   与 reqwest 系客户端一致）；二进制表示法渲染为其文本形式。

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;

use crate::error::{Error, Kind};

/// 一个已识别的请求体文本编码。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8（默认）。别名：`utf8`、`utf-8`
    #[default]
    Utf8,
    /// 小端 UTF-16。别名：`utf16le`、`utf-16le`、`ucs2`、`ucs-2`
    Utf16Le,
    /// ISO-8859-1 风格的单字节编码。码点按低 8 位截断
    Latin1,
    /// 7 位 ASCII。码点按低 7 位截断
    Ascii,
    /// 标准 base64（带填充）
    Base64,
    /// URL 安全 base64（无填充）
    Base64Url,
    /// 十六进制
    Hex,
}

impl Encoding {
    /// 编码集合中的规范名称。
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Utf16Le => "utf16le",
            Encoding::Latin1 => "latin1",
            Encoding::Ascii => "ascii",
            Encoding::Base64 => "base64",
            Encoding::Base64Url => "base64url",
            Encoding::Hex => "hex",
        }
    }

    /// 把文本转为请求体字节。
    ///
    /// `base64`/`base64url`/`hex` 要求文本本身符合该表示法，
    /// 否则以 `BodyEncodingInvalid` 失败。其余方向不会失败。
    pub(crate) fn encode(&self, text: &str) -> Result<Vec<u8>, Error> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Utf16Le => Ok(text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect()),
            // Truncate each UTF-16 code unit, the way Node's Buffer does.
            Encoding::Latin1 => Ok(text
                .encode_utf16()
                .map(|unit| (unit & 0xFF) as u8)
                .collect()),
            Encoding::Ascii => Ok(text
                .encode_utf16()
                .map(|unit| (unit & 0x7F) as u8)
                .collect()),
            Encoding::Base64 => STANDARD
                .decode(text)
                .map_err(|e| Error::new(Kind::BodyEncodingInvalid).with(e)),
            Encoding::Base64Url => URL_SAFE_NO_PAD
                .decode(text)
                .map_err(|e| Error::new(Kind::BodyEncodingInvalid).with(e)),
            Encoding::Hex => {
                hex::decode(text).map_err(|e| Error::new(Kind::BodyEncodingInvalid).with(e))
            }
        }
    }

    /// 把响应体字节转为文本。
    ///
    /// 文本型编码走 `encoding_rs` 的 WHATWG 标签查找，解码是宽容的
    /// （非法序列替换为 U+FFFD，后续 JSON 解析自然失败）；
    /// 二进制表示法渲染为其文本形式，不会失败。
    pub(crate) fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Base64 => STANDARD.encode(bytes),
            Encoding::Base64Url => URL_SAFE_NO_PAD.encode(bytes),
            Encoding::Hex => hex::encode(bytes),
            Encoding::Utf8 | Encoding::Utf16Le | Encoding::Latin1 | Encoding::Ascii => {
                let encoding = encoding_rs::Encoding::for_label(self.whatwg_label().as_bytes())
                    .unwrap_or(encoding_rs::UTF_8);
                let (text, _, _) = encoding.decode(bytes);
                text.into_owned()
            }
        }
    }

    /// `encoding_rs` 标签查找使用的 WHATWG 名称。
    fn whatwg_label(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Latin1 => "latin1",
            Encoding::Ascii => "ascii",
            Encoding::Base64 | Encoding::Base64Url | Encoding::Hex => unreachable!(),
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    /// 解析集合内的编码名，大小写不敏感，别名折叠。
    fn from_str(s: &str) -> Result<Encoding, Error> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Ok(Encoding::Utf16Le),
            "latin1" => Ok(Encoding::Latin1),
            "ascii" => Ok(Encoding::Ascii),
            "base64" => Ok(Encoding::Base64),
            "base64url" => Ok(Encoding::Base64Url),
            "hex" => Ok(Encoding::Hex),
            other => Err(Error::new(Kind::BodyEncodingInvalid)
                .with(format!("unrecognized encoding `{}`", other))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
