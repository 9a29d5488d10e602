//! A scripted single-threaded HTTP server for adapter tests.
//!
//! Compiled for this crate's tests and, with the `test-util` feature, for
//! the tests of crates that talk to other HTTP services.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by the server. Headers are lowercased.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request_line: String,
    pub headers: String,
    pub body: String,
}

/// Answer one request per scripted `(status, body)` pair, in order.
pub async fn serve(
    responses: Vec<(u16, String)>,
) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];

            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = headers
                .lines()
                .find_map(|l| {
                    let lower = l.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before body");
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            recorded.push(Recorded {
                request_line: headers.lines().next().unwrap_or_default().to_string(),
                headers: headers.to_ascii_lowercase(),
                body: String::from_utf8_lossy(&buf[header_end..header_end + content_length])
                    .to_string(),
            });
        }
        recorded
    });

    (format!("http://{addr}"), handle)
}
