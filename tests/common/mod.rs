//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What a programmable upstream does with one request.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Respond with this status and body.
    Reply(u16, String),
    /// Close the socket without responding (connection-level failure).
    Hangup,
}

/// Start a simple mock upstream that returns a fixed 200 response.
pub async fn start_mock_upstream(addr: SocketAddr, response: &'static str) {
    start_programmable_upstream(addr, move |_path| async move {
        Scripted::Reply(200, response.to_string())
    })
    .await;
}

/// Start a programmable mock upstream. The closure receives the request
/// path and decides the outcome per request.
pub async fn start_programmable_upstream<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Scripted> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let path = read_request_path(&mut socket).await;
                        match f(path).await {
                            Scripted::Reply(status, body) => {
                                let status_text = match status {
                                    200 => "200 OK",
                                    404 => "404 Not Found",
                                    429 => "429 Too Many Requests",
                                    500 => "500 Internal Server Error",
                                    502 => "502 Bad Gateway",
                                    503 => "503 Service Unavailable",
                                    _ => "200 OK",
                                };
                                let response_str = format!(
                                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                    status_text,
                                    body.len(),
                                    body
                                );
                                let _ = socket.write_all(response_str.as_bytes()).await;
                            }
                            Scripted::Hangup => {}
                        }
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Read the request head and pull the path out of the request line.
async fn read_request_path(socket: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                head.extend_from_slice(&buf[..n]);
                if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() > 8192 {
                    break;
                }
            }
        }
    }
    let text = String::from_utf8_lossy(&head);
    text.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string()
}
