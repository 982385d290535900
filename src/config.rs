//! 请求配置与构造校验。
//!
//! [`Builder`] 把宽松的入口类型（字符串 URL、字符串方法、字符串编码名）
//! 收敛为一份构造后不可变的 [`Config`]。所有校验失败在 `build()` 同步
//! 返回，此时不产生任何实例；首个错误获胜（与 `http::request::Builder`
//! 的错误槽模式一致）。

use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Uri};

use crate::body::Body;
use crate::client::OneShot;
use crate::connect::Origin;
use crate::encoding::Encoding;
use crate::error::{Error, Kind};

/// 未显式配置时的超时时长。
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// 方法的封闭集合。
const METHODS: &[Method] = &[
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
];

/// 一次请求的完整配置，构造后不可变。
#[derive(Debug)]
pub struct Config {
    pub(crate) uri: Uri,
    pub(crate) origin: Origin,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) timeout: Duration,
    pub(crate) body: Option<Body>,
    pub(crate) auto_json_response_parse: bool,
}

impl Config {
    /// 请求的目标 URI。
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// 请求方法。
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// 请求头（保留插入顺序，名称大小写不敏感）。
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 两阶段计时器共用的超时时长。
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 是否对 `application/json` 响应自动做 JSON 解码。
    pub fn auto_json_response_parse(&self) -> bool {
        self.auto_json_response_parse
    }
}

/// 请求实例的构造器。
///
/// 通过 [`OneShot::builder`] 获得。每个设置方法返回 `Self` 支持链式
/// 调用；入参不合法时错误被记录，`build()` 时抛出。
#[derive(Debug)]
pub struct Builder {
    uri: Option<Uri>,
    method: Method,
    headers: HeaderMap,
    timeout: Duration,
    body: Option<Body>,
    auto_json_response_parse: bool,
    err: Option<Error>,
}

impl Builder {
    /// 以目标 URL 开始构造。接受字符串或已解析的 `Uri`。
    pub fn new<U>(url: U) -> Builder
    where
        Uri: TryFrom<U>,
        <Uri as TryFrom<U>>::Error: Into<http::Error>,
    {
        let mut builder = Builder {
            uri: None,
            method: Method::GET,
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            body: None,
            auto_json_response_parse: true,
            err: None,
        };
        match Uri::try_from(url) {
            Ok(uri) => builder.uri = Some(uri),
            Err(e) => builder.err = Some(Error::new(Kind::UrlInvalid).with(e.into())),
        }
        builder
    }

    /// 设置请求方法。接受 `http::Method` 或字符串形式。
    ///
    /// 方法必须属于封闭集合 {GET, POST, PUT, DELETE, PATCH, HEAD}。
    pub fn method<M>(mut self, method: M) -> Builder
    where
        Method: TryFrom<M>,
        <Method as TryFrom<M>>::Error: Into<http::Error>,
    {
        match Method::try_from(method) {
            Ok(m) if METHODS.contains(&m) => self.method = m,
            Ok(m) => {
                self.record(
                    Error::new(Kind::MethodInvalid).with(format!("unsupported method `{}`", m)),
                );
            }
            Err(e) => self.record(Error::new(Kind::MethodInvalid).with(e.into())),
        }
        self
    }

    /// 追加一个请求头。插入顺序保留在线上序列化里。
    pub fn header<K, V>(mut self, name: K, value: V) -> Builder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(name).map_err(Into::into);
        let value = HeaderValue::try_from(value).map_err(Into::into);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) | (_, Err(e)) => {
                self.record(Error::new(Kind::HeaderInvalid).with(e));
            }
        }
        self
    }

    /// 整体替换请求头集合。
    pub fn headers(mut self, headers: HeaderMap) -> Builder {
        self.headers = headers;
        self
    }

    /// 设置两阶段计时器共用的超时时长，必须不小于 1 毫秒。
    pub fn timeout(mut self, timeout: Duration) -> Builder {
        self.timeout = timeout;
        self
    }

    /// 设置请求体。
    pub fn body(mut self, body: impl Into<Body>) -> Builder {
        self.body = Some(body.into());
        self
    }

    /// 设置文本请求体，编码按名称从封闭集合解析。
    pub fn body_text(mut self, text: impl Into<String>, encoding: &str) -> Builder {
        match encoding.parse::<Encoding>() {
            Ok(enc) => self.body = Some(Body::text(text, enc)),
            Err(e) => self.record(e),
        }
        self
    }

    /// 设置序列化为 JSON 的结构值请求体。
    pub fn body_json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> Builder {
        self.body = Some(Body::json(value));
        self
    }

    /// 开关 `application/json` 响应的自动 JSON 解码（默认开启）。
    pub fn auto_json_response_parse(mut self, enabled: bool) -> Builder {
        self.auto_json_response_parse = enabled;
        self
    }

    /// 校验全部参数并产出请求实例。
    ///
    /// 任何校验失败都在此同步返回，不产生实例。
    pub fn build(self) -> Result<OneShot, Error> {
        if let Some(err) = self.err {
            return Err(err);
        }
        let uri = self.uri.expect("uri parse error recorded");
        let origin = Origin::from_uri(&uri)?;
        if self.timeout < Duration::from_millis(1) {
            return Err(Error::new(Kind::TimeoutInvalid)
                .with(format!("timeout of {:?} is below 1ms", self.timeout)));
        }
        Ok(OneShot::new(Config {
            uri,
            origin,
            method: self.method,
            headers: self.headers,
            timeout: self.timeout,
            body: self.body,
            auto_json_response_parse: self.auto_json_response_parse,
        }))
    }

    /// 记录首个校验错误，后续错误被忽略。
    fn record(&mut self, err: Error) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let shot = Builder::new("http://localhost/").build().unwrap();
        let cfg = shot.config().expect("config present before perform");
        assert_eq!(cfg.method, Method::GET);
        assert!(cfg.headers.is_empty());
        assert_eq!(cfg.timeout, Duration::from_secs(60));
        assert!(cfg.body.is_none());
        assert!(cfg.auto_json_response_parse);
    }

    #[test]
    fn unparseable_url_is_rejected() {
        let err = Builder::new("http://[broken").build().unwrap_err();
        assert_eq!(err.kind(), Kind::UrlInvalid);
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = Builder::new("ftp://example.org/x").build().unwrap_err();
        assert_eq!(err.kind(), Kind::UrlSchemeInvalid);
    }

    #[test]
    fn method_outside_the_closed_set_is_rejected() {
        let err = Builder::new("http://localhost/")
            .method("TRACE")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), Kind::MethodInvalid);

        let err = Builder::new("http://localhost/")
            .method("not a method")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), Kind::MethodInvalid);
    }

    #[test]
    fn head_is_part_of_the_closed_set() {
        assert!(Builder::new("http://localhost/").method("HEAD").build().is_ok());
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = Builder::new("http://localhost/")
            .header("bad header\n", "x")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), Kind::HeaderInvalid);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Builder::new("http://localhost/")
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), Kind::TimeoutInvalid);
    }

    #[test]
    fn unknown_body_encoding_is_rejected() {
        let err = Builder::new("http://localhost/")
            .body_text("x", "utf-32")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), Kind::BodyEncodingInvalid);
    }

    #[test]
    fn first_recorded_error_wins() {
        let err = Builder::new("http://localhost/")
            .method("TRACE")
            .header("also bad\n", "x")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), Kind::MethodInvalid);
    }

    #[test]
    fn headers_keep_insertion_order() {
        let shot = Builder::new("http://localhost/")
            .header("x-first", "1")
            .header("x-second", "2")
            .header("x-third", "3")
            .build()
            .unwrap();
        let cfg = shot.config().unwrap();
        let names: Vec<_> = cfg.headers.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, ["x-first", "x-second", "x-third"]);
    }
}
