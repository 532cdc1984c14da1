//! Minimal HTTP/1.1 stand-in for the downloader service, for integration
//! tests: serves a canned NDJSON catalog, accepts a job submission, and
//! replays a scripted SSE progress feed.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Default)]
pub struct MockService {
    /// NDJSON lines returned by both catalog endpoints.
    pub catalog_lines: Vec<String>,
    /// JSON payloads replayed as `data:` frames on the progress feed.
    pub events: Vec<String>,
    /// Handle returned by the submission endpoint.
    pub download_id: String,
    /// Delay before the progress frames are written, keeping the feed
    /// open so a job stays in flight.
    pub progress_hold_ms: u64,
}

/// Starts the mock in a background thread. Returns the base URL. The
/// listener runs until the process exits; each connection is handled once
/// and closed (the client reconnects per request).
pub fn start(svc: MockService) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let svc = Arc::new(svc);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let svc = Arc::clone(&svc);
            thread::spawn(move || handle(stream, &svc));
        }
    });
    format!("http://127.0.0.1:{}", port)
}

fn handle(mut stream: std::net::TcpStream, svc: &MockService) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));

    let request = match read_request(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let path = request
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let response = if path.starts_with("/api/load_videos") {
        let mut body = svc.catalog_lines.join("\n");
        body.push('\n');
        respond("application/x-ndjson", &body)
    } else if path == "/api/download_videos" {
        respond(
            "application/json",
            &format!(
                r#"{{"download_id":"{}","status":"started","total":{}}}"#,
                svc.download_id,
                svc.events.len()
            ),
        )
    } else if path.starts_with("/api/download_progress/") {
        let body: String = svc
            .events
            .iter()
            .map(|e| format!("data: {}\n\n", e))
            .collect();
        if svc.progress_hold_ms > 0 {
            // Headers first so the subscription opens, then hold before
            // the frames; body ends at EOF.
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
            );
            let _ = stream.flush();
            thread::sleep(std::time::Duration::from_millis(svc.progress_hold_ms));
            let _ = stream.write_all(body.as_bytes());
            let _ = stream.flush();
            return;
        }
        respond("text/event-stream", &body)
    } else if path == "/api/download/stop" {
        respond("application/json", r#"{"message":"Stop command received"}"#)
    } else if path == "/api/choose-directory" {
        respond("application/json", r#"{"path":"/tmp/vget-media"}"#)
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    };

    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn respond(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Reads the request head plus any Content-Length body. Returns the head.
fn read_request(stream: &mut std::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(String::from))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body_read = buf.len() - (head_end + 4);
    while body_read < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body_read += n;
    }
    Some(head)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
