//! 连接建立：DNS 解析、TCP 连接与可选的 TLS 握手。
//!
//! 本模块产出驱动器独占持有的传输句柄 [`Io`]——一个在明文 TCP 与
//! rustls TLS 流之间二选一的枚举，对上层统一暴露
//! `AsyncRead + AsyncWrite`。TLS 栈使用 `tokio-rustls` 加
//! `webpki-roots` 内置根证书。
//!
//! 同时定义 [`Origin`]（`scheme://host:port` 三元组），超时与取消类
//! 错误在消息中携带它。

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use http::Uri;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Kind};

/// 请求的来源三元组：`scheme://host:port`。
///
/// 端口在 URL 未写明时按 scheme 取默认值（80 / 443）。
#[derive(Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: &'static str,
    host: String,
    port: u16,
}

impl Origin {
    /// 从已校验的 URI 派生来源。
    ///
    /// scheme 不是 `http`/`https` 或缺少主机时失败——构造校验依赖
    /// 这里作为唯一的判定点。
    pub(crate) fn from_uri(uri: &Uri) -> Result<Origin, Error> {
        let scheme = match uri.scheme_str() {
            Some("http") => "http",
            Some("https") => "https",
            Some(other) => {
                return Err(Error::new(Kind::UrlSchemeInvalid)
                    .with(format!("unsupported scheme `{}`", other)))
            }
            None => return Err(Error::new(Kind::UrlSchemeInvalid).with("relative URL")),
        };
        let host = match uri.host() {
            Some(host) if !host.is_empty() => host.to_owned(),
            _ => return Err(Error::new(Kind::UrlInvalid).with("URL has no host")),
        };
        let port = uri
            .port_u16()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });
        Ok(Origin { scheme, host, port })
    }

    /// 来源的 scheme（`http` 或 `https`）。
    pub fn scheme(&self) -> &str {
        self.scheme
    }

    /// 来源的主机名。
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 来源的端口。
    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// 用于连接与 SNI 的主机形式（IPv6 字面量去掉方括号）。
    fn dns_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    #[cfg(test)]
    pub(crate) fn test(scheme: &'static str, host: &str, port: u16) -> Origin {
        Origin {
            scheme,
            host: host.to_owned(),
            port,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 驱动器独占持有的传输流。
pub(crate) enum Io {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Io {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Io {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_flush(cx),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Io::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// 进程级共享的 rustls 客户端配置，首次 HTTPS 连接时构建。
fn tls_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}

/// 建立到来源的连接。
///
/// 解析失败映射为 `HostnameNotFound`；TCP/TLS 层的系统错误经
/// [`Error::from_io`] 进入公开分类。逐个尝试解析出的地址，
/// 全部失败时报告最后一个错误。
pub(crate) async fn connect(origin: &Origin) -> Result<Io, Error> {
    let host = origin.dns_host();
    let addrs: Vec<_> = tokio::net::lookup_host((host, origin.port()))
        .await
        .map_err(|e| Error::new(Kind::HostnameNotFound).with(e).with_origin(origin.clone()))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::new(Kind::HostnameNotFound).with_origin(origin.clone()));
    }

    let mut last_err = None;
    let mut stream = None;
    for addr in addrs {
        trace!("connecting to {}", addr);
        match TcpStream::connect(addr).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    let stream = match stream {
        Some(s) => s,
        None => {
            return Err(Error::from_io(
                last_err.expect("no addresses attempted"),
                origin.clone(),
            ))
        }
    };
    let _ = stream.set_nodelay(true);

    if !origin.is_https() {
        return Ok(Io::Plain(stream));
    }

    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|e| Error::new(Kind::UrlInvalid).with(e))?;
    let connector = TlsConnector::from(tls_config());
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::from_io(e, origin.clone()))?;
    debug!("TLS handshake complete for {}", origin);
    Ok(Io::Tls(Box::new(tls)))
}
