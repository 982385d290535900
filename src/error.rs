//! 错误与结果类型模块。
//!
//! 本模块定义了 crate 的核心错误类型 [`Error`] 及其公开的分类 [`Kind`]。
//! 一次请求生命周期中所有可能的失败——构造参数校验、状态机违规、两阶段
//! 超时、取消、传输层系统错误、响应装配失败——都统一封装在 `Error` 中。
//!
//! ## 设计理念
//!
//! - **不透明错误**：`Error` 用 `Arc<ErrorImpl>` 包装内部实现，栈上仅占
//!   一个指针宽度。与常见的 `Box` 包装不同，这里选择 `Arc` 是因为请求的
//!   结果通过共享的 promise 句柄被多次观察，错误必须可以克隆。
//! - **错误链**：底层原因通过 `std::error::Error::source()` 暴露。
//! - **来源标注**：超时与取消类错误携带请求的 [`Origin`]
//!   （`scheme://host:port`），显示在错误消息里。

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::connect::Origin;

/// 本 crate 常用的 `Result` 类型别名。
pub type Result<T> = std::result::Result<T, Error>;

/// 类型擦除的错误原因。
///
/// `Send + Sync` 约束确保错误可以安全地跨线程传递，即使请求实例本身
/// 被限定在单线程上。
type Cause = Box<dyn StdError + Send + Sync>;

/// 处理一次 HTTP 请求时可能发生的错误。
///
/// # 格式化
///
/// `Display` 实现只打印当前层级的错误详情。要打印完整的 source 链，
/// 请使用 `std::error::Report` 或等效的第三方类型。
/// 错误消息的具体措辞不属于稳定 API，可能在任何版本中更改。
#[derive(Clone)]
pub struct Error {
    inner: std::sync::Arc<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
    /// 请求来源，超时/取消类错误在消息中携带它
    origin: Option<Origin>,
    /// 触发超时的配置时长，仅超时类错误携带
    timeout: Option<Duration>,
}

/// 错误分类。
///
/// 与许多库不同，分类枚举是公开的：调用方通过 [`Error::kind`] 做精确
/// 匹配，而不是依赖一长串 `is_*` 方法。`#[non_exhaustive]` 保留了将来
/// 增加分类的余地。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Kind {
    // ===== 构造校验 =====
    /// URL 字符串无法解析，或缺少主机部分
    UrlInvalid,
    /// URL 的 scheme 不是 `http` 或 `https`
    UrlSchemeInvalid,
    /// 方法不在封闭集合 {GET, POST, PUT, DELETE, PATCH, HEAD} 内
    MethodInvalid,
    /// 头部名称或值不合法
    HeaderInvalid,
    /// 超时时长小于 1 毫秒
    TimeoutInvalid,
    /// 文本编码名不在封闭集合内，或文本不符合所声明的二进制表示
    BodyEncodingInvalid,
    /// 响应状态码不在 [100, 599] 区间内
    StatusCodeInvalid,

    // ===== 状态机违规（同步抛出） =====
    /// 在非 `Created`/`Requesting` 状态调用了 `perform()`
    PerformUnavailable,
    /// 在非 `Requesting`/`Cancelling` 状态调用了 `cancel()`
    CancelUnavailable,

    // ===== 运行期 =====
    /// 请求阶段计时器触发：写入请求期间超过配置时长无进展
    RequestTimedOut,
    /// 响应阶段计时器触发：等待响应期间超过配置时长无进展
    ResponseTimedOut,
    /// 请求被 `cancel()` 取消
    RequestCancelled,
    /// 响应声明为 JSON 但字节无法按声明的字符集解析为 JSON
    ResponseBodyNotJson,
    /// 请求体无法序列化为 JSON
    BodyNotSerializable,

    // ===== 传输层系统错误映射 =====
    /// 连接被对端重置（ECONNRESET），包括消息未完成时对端关闭连接
    ConnectionReset,
    /// 向已关闭的连接写入（EPIPE）
    BrokenPipe,
    /// 对端拒绝连接（ECONNREFUSED）
    ConnectionRefused,
    /// 连接被中止（ECONNABORTED）
    ConnectionAborted,
    /// 主机不可达（EHOSTUNREACH）
    HostUnreachable,
    /// 网络不可达（ENETUNREACH）
    NetworkUnreachable,
    /// 网络已断开（ENETDOWN）
    NetworkDown,
    /// 主机名解析失败
    HostnameNotFound,
    /// 套接字层超时（ETIMEDOUT），区别于本 crate 自身的两阶段计时器
    ConnectionTimedOut,

    // ===== 协议 =====
    /// 响应头或消息体分帧无法解析
    Protocol,

    // ===== 兜底 =====
    /// 无法识别的失败
    Unknown,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: std::sync::Arc::new(ErrorImpl {
                kind,
                cause: None,
                origin: None,
                timeout: None,
            }),
        }
    }

    /// 为错误附加底层原因，builder 风格链式调用。
    ///
    /// 仅在构造期（`Arc` 尚未被克隆）调用，`get_mut` 必然成功。
    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        std::sync::Arc::get_mut(&mut self.inner)
            .expect("error mutated after sharing")
            .cause = Some(cause.into());
        self
    }

    pub(crate) fn with_origin(mut self, origin: Origin) -> Error {
        std::sync::Arc::get_mut(&mut self.inner)
            .expect("error mutated after sharing")
            .origin = Some(origin);
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Error {
        std::sync::Arc::get_mut(&mut self.inner)
            .expect("error mutated after sharing")
            .timeout = Some(timeout);
        self
    }

    /// 返回此错误的分类。
    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// 返回产生此错误的请求来源（`scheme://host:port`），如果有的话。
    pub fn origin(&self) -> Option<&Origin> {
        self.inner.origin.as_ref()
    }

    /// 如果错误由任一超时（两阶段计时器或套接字层）引起，返回 `true`。
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::RequestTimedOut | Kind::ResponseTimedOut | Kind::ConnectionTimedOut
        )
    }

    /// 如果错误由 `cancel()` 引起，返回 `true`。
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.kind, Kind::RequestCancelled)
    }

    /// 如果错误是同步抛出的状态机违规，返回 `true`。
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::PerformUnavailable | Kind::CancelUnavailable
        )
    }

    // ===== 内部构造便捷方法 =====

    pub(crate) fn new_request_timeout(origin: Origin, timeout: Duration) -> Error {
        Error::new(Kind::RequestTimedOut)
            .with_origin(origin)
            .with_timeout(timeout)
    }

    pub(crate) fn new_response_timeout(origin: Origin, timeout: Duration) -> Error {
        Error::new(Kind::ResponseTimedOut)
            .with_origin(origin)
            .with_timeout(timeout)
    }

    pub(crate) fn new_cancelled(origin: Origin) -> Error {
        Error::new(Kind::RequestCancelled).with_origin(origin)
    }

    /// 将传输层的 `io::Error` 映射进公开分类。
    ///
    /// 携带可识别系统码的错误映射到对应的具名分类；
    /// 其余归入 `Unknown`，原始错误保留在 source 链上。
    pub(crate) fn from_io(err: io::Error, origin: Origin) -> Error {
        let kind = match err.kind() {
            io::ErrorKind::ConnectionReset => Kind::ConnectionReset,
            io::ErrorKind::BrokenPipe => Kind::BrokenPipe,
            io::ErrorKind::ConnectionRefused => Kind::ConnectionRefused,
            io::ErrorKind::ConnectionAborted => Kind::ConnectionAborted,
            io::ErrorKind::HostUnreachable => Kind::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => Kind::NetworkUnreachable,
            io::ErrorKind::NetworkDown => Kind::NetworkDown,
            io::ErrorKind::TimedOut => Kind::ConnectionTimedOut,
            _ => Kind::Unknown,
        };
        Error::new(kind).with_origin(origin).with(err)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::UrlInvalid => "invalid URL",
            Kind::UrlSchemeInvalid => "URL scheme must be `http` or `https`",
            Kind::MethodInvalid => "unrecognized HTTP method",
            Kind::HeaderInvalid => "invalid header",
            Kind::TimeoutInvalid => "timeout must be at least one millisecond",
            Kind::BodyEncodingInvalid => "invalid body encoding",
            Kind::StatusCodeInvalid => "status code out of range 100-599",
            Kind::PerformUnavailable => "perform is not available in the current state",
            Kind::CancelUnavailable => "cancel is not available in the current state",
            Kind::RequestTimedOut => "request timed out",
            Kind::ResponseTimedOut => "response timed out",
            Kind::RequestCancelled => "request was cancelled",
            Kind::ResponseBodyNotJson => "response body is not parseable as JSON",
            Kind::BodyNotSerializable => "request body object is not serializable",
            Kind::ConnectionReset => "connection reset by peer",
            Kind::BrokenPipe => "broken pipe",
            Kind::ConnectionRefused => "connection refused",
            Kind::ConnectionAborted => "connection aborted",
            Kind::HostUnreachable => "host unreachable",
            Kind::NetworkUnreachable => "network unreachable",
            Kind::NetworkDown => "network is down",
            Kind::HostnameNotFound => "hostname not found",
            Kind::ConnectionTimedOut => "socket-level connection timed out",
            Kind::Protocol => "malformed HTTP response",
            Kind::Unknown => "unknown error",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("onereq::Error");
        f.field(&self.inner.kind);
        if let Some(ref origin) = self.inner.origin {
            f.field(origin);
        }
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())?;
        if let Some(timeout) = self.inner.timeout {
            write!(f, " after {}ms", timeout.as_millis())?;
        }
        if let Some(ref origin) = self.inner.origin {
            write!(f, " ({})", origin)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}
