//! 回环 fixture 服务器。
//!
//! 手写的极简 HTTP/1.1 服务端，端点模拟静默拒绝（RST）、静默超时、
//! 回显与各类 JSON 响应。每个测试进程内监听一个随机端口。

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct FixtureServer {
    addr: SocketAddr,
    accept: JoinHandle<()>,
}

impl FixtureServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

pub async fn spawn() -> FixtureServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture server");
    let addr = listener.local_addr().expect("fixture server addr");
    let accept = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(serve(stream));
                }
                Err(_) => break,
            }
        }
    });
    FixtureServer { addr, accept }
}

struct Request {
    method: String,
    path: String,
    content_type: Option<String>,
    content_length: usize,
    /// 与头部同批到达的消息体前缀
    body_prefix: Vec<u8>,
}

async fn serve(mut stream: TcpStream) {
    let request = match read_request_head(&mut stream).await {
        Some(request) => request,
        None => return,
    };

    match request.path.as_str() {
        "/silentrejection" => {
            // linger(0) turns the close into an RST
            let _ = stream.set_linger(Some(Duration::from_secs(0)));
            drop(stream);
        }
        "/silenttimeout" => {
            // accept, then go silent with the socket held open
            std::future::pending::<()>().await
        }
        "/silentresponse" => {
            let _ = stream
                .write_all(b"HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n")
                .await;
            let _ = stream.flush().await;
        }
        "/checkpattern" => {
            let body = match read_body(&mut stream, &request).await {
                Some(body) => body,
                None => return,
            };
            let content_type = request
                .content_type
                .as_deref()
                .unwrap_or("application/octet-stream");
            respond(&mut stream, 200, "OK", content_type, &body).await;
        }
        "/json" => {
            respond(
                &mut stream,
                200,
                "OK",
                "application/json; charset=utf-8",
                br#"{"hello":"world","count":3}"#,
            )
            .await;
        }
        "/json16" => {
            let body: Vec<u8> = r#"{"wide":true}"#
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect();
            respond(
                &mut stream,
                200,
                "OK",
                "application/json; charset=utf16le",
                &body,
            )
            .await;
        }
        "/jsonbad" => {
            respond(&mut stream, 200, "OK", "application/json", b"not json at all").await;
        }
        "/drip" => {
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 6\r\nconnection: close\r\n\r\n")
                .await;
            let _ = stream.flush().await;
            for byte in b"dreams" {
                tokio::time::sleep(Duration::from_millis(60)).await;
                if stream.write_all(&[*byte]).await.is_err() {
                    return;
                }
                let _ = stream.flush().await;
            }
        }
        _ => {
            respond(&mut stream, 404, "Not Found", "text/plain", b"not found").await;
        }
    }
}

async fn respond(stream: &mut TcpStream, status: u16, reason: &str, content_type: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        status,
        reason,
        content_type,
        body.len(),
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = stream.write_all(body).await;
    let _ = stream.flush().await;
}

async fn read_request_head(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::with_capacity(1024);
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = std::str::from_utf8(&buf[..head_end]).ok()?;
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_owned();
    let path = request_line.next()?.to_owned();

    let mut content_type = None;
    let mut content_length = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_owned());
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
        }
    }

    Some(Request {
        method,
        path,
        content_type,
        content_length,
        body_prefix: buf[head_end + 4..].to_vec(),
    })
}

async fn read_body(stream: &mut TcpStream, request: &Request) -> Option<Vec<u8>> {
    let mut body = request.body_prefix.clone();
    while body.len() < request.content_length {
        let mut chunk = vec![0u8; 64 * 1024];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }
    body.truncate(request.content_length);
    Some(body)
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}
