#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # onereq
//!
//! A one-shot, promise-style HTTP/HTTPS client.
//!
//! Every [`OneShot`] instance represents exactly one outbound request whose
//! lifetime is governed by an explicit state machine: construct the instance
//! with validated parameters, invoke [`perform()`][OneShot::perform] to drive
//! the request to completion, optionally invoke
//! [`cancel()`][OneShot::cancel] to abort it in flight, and observe the
//! result exactly once as a [`Response`] or a typed [`Error`].
//!
//! ## Features
//!
//! - Explicit six-state lifecycle, observable through
//!   [`state()`][OneShot::state]
//! - Two mutually exclusive idle timers: one while the request is being
//!   written, one while the response is awaited, both refreshed on progress
//! - Cooperative cancellation with an acknowledged teardown
//! - Request bodies as bytes, text under a named encoding, or JSON values
//! - Automatic JSON decoding of `application/json` responses
//! - A flat error taxonomy mapping transport-level system errors to named
//!   kinds
//!
//! ## One instance, one thread
//!
//! An instance and its driver task share a single thread; `perform()` spawns
//! the driver with [`tokio::task::spawn_local`] and therefore must run inside
//! a [`tokio::task::LocalSet`]:
//!
//! ```no_run
//! use onereq::OneShot;
//! use tokio::task::LocalSet;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rt = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()?;
//! LocalSet::new().block_on(&rt, async {
//!     let req = OneShot::builder("http://httpbin.org/ip").build()?;
//!     let response = req.perform()?.await?;
//!     println!("{} {}", response.status_code(), response.status_message());
//!     Ok(())
//! })
//! # }
//! ```
//!
//! ## Non-goals
//!
//! Connection pooling and keep-alive reuse, retries, redirect following,
//! response-body streaming, pipelining, and HTTP/2+ are out of scope; the
//! response body is delivered as one finished artifact.

// 隐藏地重新导出 http crate，供下游通过 `onereq::http` 访问。
#[doc(hidden)]
pub use http;

// 从 `http` crate 重新导出常用类型，用户无需单独声明 `http` 依赖。
#[doc(no_inline)]
pub use http::{header, HeaderMap, Method, StatusCode, Uri};

pub use crate::body::Body;
pub use crate::client::{Cancel, OneShot, Perform};
pub use crate::config::{Builder, Config, DEFAULT_TIMEOUT};
pub use crate::connect::Origin;
pub use crate::encoding::Encoding;
pub use crate::error::{Error, Result};
pub use crate::response::{Response, ResponseBody};
pub use crate::state::State;

// `#[macro_use]` 使 trace 模块中的日志宏在整个 crate 内可用。
// 此模块必须最先声明，后续模块都依赖这些宏。
#[macro_use]
mod trace;

// 请求体变体与编码器
mod body;
// 公开的请求实例：perform/cancel/state
mod client;
// 配置与构造校验
mod config;
// 连接建立（DNS/TCP/TLS）与 Origin
mod connect;
// 传输驱动器与一次性拆除
mod driver;
// 文本编码的封闭集合
mod encoding;
/// 错误类型与公开的分类枚举。
pub mod error;
// 头部工具与 Content-Type 小语法
mod headers;
// HTTP/1.1 编解码
mod proto;
// 响应值类型与装配
mod response;
// 六状态生命周期
mod state;
// 两阶段超时控制器
mod timeout;
