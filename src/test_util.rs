//! Scripted HTTP responder for exercising the Chroma and Ollama clients.
//!
//! Serves one canned response per accepted connection, in order, and
//! records every request it read.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A response written in parts, each preceded by a pause
pub struct ScriptedResponse {
    parts: Vec<(Duration, Vec<u8>)>,
}

impl ScriptedResponse {
    /// Hold the whole response back for `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        if let Some(first) = self.parts.first_mut() {
            first.0 = delay;
        }
        self
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

/// Complete response with a Content-Length body
pub fn http_response(status: u16, content_type: &str, body: &str) -> ScriptedResponse {
    let raw = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        reason(status),
        content_type,
        body.len(),
        body
    );
    ScriptedResponse {
        parts: vec![(Duration::ZERO, raw.into_bytes())],
    }
}

/// Close-delimited NDJSON response written one line at a time
pub fn ndjson_response(lines: &[&str], gap: Duration) -> ScriptedResponse {
    let lines: Vec<&[u8]> = lines.iter().map(|l| l.as_bytes()).collect();
    ndjson_bytes_response(&lines, gap)
}

/// Like `ndjson_response`, for lines that need not be valid UTF-8
pub fn ndjson_bytes_response(lines: &[&[u8]], gap: Duration) -> ScriptedResponse {
    let head = "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n";
    let mut parts = vec![(Duration::ZERO, head.as_bytes().to_vec())];
    for line in lines {
        let mut bytes = line.to_vec();
        bytes.push(b'\n');
        parts.push((gap, bytes));
    }
    ScriptedResponse { parts }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

pub struct ScriptedServer {
    addr: SocketAddr,
    handle: JoinHandle<Vec<CapturedRequest>>,
}

impl ScriptedServer {
    pub async fn start(responses: Vec<ScriptedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut captured = Vec::new();
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                match read_request(&mut socket).await {
                    Ok(request) => captured.push(request),
                    Err(_) => continue,
                }
                for (pause, bytes) in response.parts {
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    if socket.write_all(&bytes).await.is_err() {
                        break;
                    }
                    let _ = socket.flush().await;
                }
                let _ = socket.shutdown().await;
            }
            captured
        });

        Self { addr, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for every scripted response to be served
    pub async fn finish(self) -> Vec<CapturedRequest> {
        self.handle.await.unwrap_or_default()
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let body_end = (header_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    Ok(CapturedRequest { method, path, body })
}
