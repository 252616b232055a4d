//! Minimal HTTP/1.1 front end: `POST /webhook` and `GET /health`.
//!
//! One request per connection; every response closes the connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use autoscore_core::{Scorer, WebhookEvent, WriteBack, dispatch};
use autoscore_sync::HealthReport;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const MAX_HEADER_LINES: usize = 100;
/// Longest accepted request, header or chunk-size line.
const MAX_LINE_BYTES: usize = 8 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared, read-only state for every connection.
pub struct App {
    pub scorer: Scorer,
    pub writer: Box<dyn WriteBack>,
    pub health: HealthReport,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Malformed(&'static str),
    #[error("request body of {0} bytes exceeds limit")]
    TooLarge(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "ok": false, "error": message.into() }))
    }
}

/// Accept connections until the listener fails.
pub async fn run(listener: TcpListener, app: Arc<App>) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("reading listener address")?;
    info!(%addr, "webhook server listening");
    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &app).await {
                warn!(%peer, error = %e, "connection failed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, app: &App) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let response = match tokio::time::timeout(READ_TIMEOUT, read_request(&mut reader)).await {
        Err(_) => Response::error(408, "request timed out"),
        Ok(Err(RequestError::Io(e))) => return Err(e),
        Ok(Err(RequestError::TooLarge(n))) => {
            Response::error(413, format!("request body of {n} bytes exceeds limit"))
        }
        Ok(Err(RequestError::Malformed(what))) => {
            Response::error(400, format!("malformed request: {what}"))
        }
        Ok(Ok(request)) => {
            debug!(method = %request.method, path = %request.path, bytes = request.body.len(), "request");
            route(app, &request).await
        }
    };
    let mut stream = reader.into_inner();
    write_response(&mut stream, &response).await
}

/// Read one request: request line, headers, and a body framed by either
/// `Transfer-Encoding: chunked` or `Content-Length`.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(line) = read_line_bounded(reader).await? else {
        return Err(RequestError::Malformed("empty request"));
    };
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(_version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(RequestError::Malformed("bad request line"));
    };
    let method = method.to_ascii_uppercase();
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut content_length = 0usize;
    let mut transfer_encoding: Option<String> = None;
    let mut header_lines = 0usize;
    loop {
        let Some(header) = read_line_bounded(reader).await? else {
            return Err(RequestError::Malformed("truncated headers"));
        };
        if header.is_empty() {
            break;
        }
        header_lines += 1;
        if header_lines > MAX_HEADER_LINES {
            return Err(RequestError::Malformed("too many headers"));
        }
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| RequestError::Malformed("bad content-length"))?;
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            transfer_encoding = Some(value.trim().to_string());
        }
    }

    // Transfer-Encoding wins over Content-Length.
    let body = match transfer_encoding {
        Some(te) => {
            let last = te.rsplit(',').next().unwrap_or("").trim();
            if !last.eq_ignore_ascii_case("chunked") {
                return Err(RequestError::Malformed("unsupported transfer-encoding"));
            }
            read_chunked(reader).await?
        }
        None => {
            if content_length > MAX_BODY_BYTES {
                return Err(RequestError::TooLarge(content_length));
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await?;
            body
        }
    };

    Ok(Request { method, path, body })
}

/// Read one line of at most [`MAX_LINE_BYTES`], without its line ending.
/// `None` at end of stream.
async fn read_line_bounded<R>(reader: &mut R) -> Result<Option<String>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = AsyncReadExt::take(&mut *reader, MAX_LINE_BYTES as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') && n >= MAX_LINE_BYTES {
        return Err(RequestError::Malformed("line too long"));
    }
    let line = String::from_utf8(buf).map_err(|_| RequestError::Malformed("non-UTF-8 line"))?;
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn read_chunked<R>(reader: &mut R) -> Result<Vec<u8>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let Some(line) = read_line_bounded(reader).await? else {
            return Err(RequestError::Malformed("truncated chunked body"));
        };
        let size = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size, 16)
            .map_err(|_| RequestError::Malformed("bad chunk size"))?;
        if size == 0 {
            break;
        }
        let total = body.len().saturating_add(size);
        if total > MAX_BODY_BYTES {
            return Err(RequestError::TooLarge(total));
        }
        let start = body.len();
        body.resize(total, 0);
        reader.read_exact(&mut body[start..]).await?;
        if read_line_bounded(reader).await?.as_deref() != Some("") {
            return Err(RequestError::Malformed("missing chunk terminator"));
        }
    }

    // Trailer section; EOF in place of the final empty line is tolerated.
    for _ in 0..=MAX_HEADER_LINES {
        match read_line_bounded(reader).await? {
            None => return Ok(body),
            Some(line) if line.is_empty() => return Ok(body),
            Some(_) => {}
        }
    }
    Err(RequestError::Malformed("too many trailers"))
}

/// Map a request to a response.
pub async fn route(app: &App, request: &Request) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/webhook") => webhook(app, &request.body).await,
        ("GET", "/health") => {
            let report = app.health;
            Response::new(report.status(), json!(report))
        }
        (_, "/webhook") | (_, "/health") => Response::error(405, "method not allowed"),
        _ => Response::error(404, "not found"),
    }
}

async fn webhook(app: &App, body: &[u8]) -> Response {
    let event = match WebhookEvent::from_slice(body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "unparseable webhook body");
            return Response::error(400, format!("invalid event: {e}"));
        }
    };
    let outcome = dispatch(&event, &app.scorer, app.writer.as_ref()).await;
    Response::new(outcome.status(), outcome.body())
}

async fn write_response<W>(stream: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(&response.body)?;
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason(response.status),
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "",
    }
}
