//! 线上协议实现。
//!
//! 本 crate 只说 HTTP/1.1：一次性请求不做连接复用，也不升级协议，
//! `h1` 子模块覆盖了请求头序列化、响应头解析与消息体分帧解码的全部。

pub(crate) mod h1;

pub(crate) use self::h1::{Decoder, ResponseHead};
