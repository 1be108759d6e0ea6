use crate::annotate::AnnotationStore;
use crate::snapshot::SnapshotStore;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

mod page;

pub use page::render_page;

const MAX_REQUEST_BYTES: usize = 8192;
const STATIC_PREFIX: &str = "/static/";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Read-only view over the snapshot store and the annotated images.
#[derive(Clone)]
struct ReadSide {
    snapshots: Arc<SnapshotStore>,
    annotations: Arc<dyn AnnotationStore>,
}

pub struct ApiServer {
    cfg: ApiConfig,
    read: ReadSide,
}

impl ApiServer {
    pub fn new(
        cfg: ApiConfig,
        snapshots: Arc<SnapshotStore>,
        annotations: Arc<dyn AnnotationStore>,
    ) -> Self {
        Self {
            cfg,
            read: ReadSide {
                snapshots,
                annotations,
            },
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let read = self.read;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, read, shutdown_thread) {
                log::error!("traffic api stopped: {}", err);
            }
        });
        log::info!("traffic api listening on http://{}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, read: ReadSide, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let read = read.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &read) {
                        log::warn!("traffic api request failed: {}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, read: &ReadSide) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    log::debug!(
        "{} {} ({})",
        request.method,
        request.path,
        request
            .headers
            .get("user-agent")
            .map(String::as_str)
            .unwrap_or("-")
    );
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/" => {
            let snapshot = read.snapshots.current_snapshot();
            let html = render_page(snapshot.as_deref());
            write_response(&mut stream, 200, "text/html; charset=utf-8", html.as_bytes())
        }
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/api/snapshot" => match read.snapshots.current_snapshot() {
            Some(snapshot) => {
                let payload = serde_json::to_vec(snapshot.as_ref())?;
                write_response(&mut stream, 200, "application/json", &payload)
            }
            None => write_json_response(&mut stream, 503, r#"{"error":"not_yet_available"}"#),
        },
        "/api/last-updated" => {
            let payload = serde_json::json!({
                "last_updated": read.snapshots.last_updated().map(|ts| ts.to_rfc3339()),
            });
            write_response(
                &mut stream,
                200,
                "application/json",
                payload.to_string().as_bytes(),
            )
        }
        path => match path.strip_prefix(STATIC_PREFIX) {
            Some(image_ref) => serve_annotation(&mut stream, read, image_ref),
            None => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
        },
    }
}

fn serve_annotation(stream: &mut TcpStream, read: &ReadSide, image_ref: &str) -> Result<()> {
    match read.annotations.load(image_ref) {
        Ok(Some(bytes)) => write_response(stream, 200, "image/jpeg", &bytes),
        Ok(None) => write_json_response(stream, 404, r#"{"error":"not_found"}"#),
        Err(err) => {
            log::debug!("rejected annotation reference '{}': {}", image_ref, err);
            write_json_response(stream, 404, r#"{"error":"not_found"}"#)
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut head: Vec<u8> = Vec::new();
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
    }
    HttpRequest::parse(&String::from_utf8_lossy(&head))
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status,
        reason_phrase(status),
        content_type,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

/// Request line and headers; bodies are never read.
#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl HttpRequest {
    fn parse(head: &str) -> Result<Self> {
        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
        let target = parts.next().ok_or_else(|| anyhow!("missing path"))?;
        let path = match target.split_once('?') {
            Some((path, _query)) => path,
            None => target,
        };
        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_and_headers() {
        let req = HttpRequest::parse(
            "GET /api/snapshot?pretty=1 HTTP/1.1\r\nHost: localhost\r\nUser-Agent: curl/8\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/snapshot");
        assert_eq!(req.headers.get("user-agent").map(String::as_str), Some("curl/8"));
    }

    #[test]
    fn rejects_empty_request() {
        assert!(HttpRequest::parse("").is_err());
    }
}
