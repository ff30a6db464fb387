use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("response already sent")]
    AlreadySent,
    #[error("exchange closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file resolved by dispatch, with the bytes to serve
#[derive(Debug, Clone)]
pub struct ServedFile {
    pub path: PathBuf,
    pub bytes: Bytes,
}

/// One request as seen by the file handler
///
/// Implemented by the host runtime. Only the request path is read; the
/// handler answers through `send_response` and then closes the exchange.
pub trait Exchange {
    /// Raw request path, possibly percent-encoded
    fn path(&self) -> &str;

    /// Context the handler is mounted under, stripped from `path`
    fn mount_context(&self) -> &str {
        ""
    }

    fn set_header(&mut self, _name: &str, _value: &str) {}

    fn send_response(&mut self, body: Bytes, status: u16) -> Result<(), ExchangeError>;

    fn close(&mut self);
}

/// Response callback invoked with the outcome of dispatch
pub trait Responder: Send + Sync {
    fn respond(
        &self,
        exchange: &mut dyn Exchange,
        served: Option<&ServedFile>,
    ) -> Result<(), ExchangeError>;
}

/// Sends found files with 200 and content headers, anything else as 404
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponder;

impl Responder for DefaultResponder {
    fn respond(
        &self,
        exchange: &mut dyn Exchange,
        served: Option<&ServedFile>,
    ) -> Result<(), ExchangeError> {
        let Some(file) = served else {
            return exchange.send_response(Bytes::new(), 404);
        };

        let mime: mime::Mime = mime_guess::from_path(&file.path).first_or_octet_stream();
        exchange.set_header("Content-Type", mime.essence_str());
        if let Some(modified) = last_modified(&file.path) {
            exchange.set_header("Last-Modified", &modified);
        }
        exchange.send_response(file.bytes.clone(), 200)
    }
}

/// HTTP-date of the file's modification time
fn last_modified(path: &std::path::Path) -> Option<String> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let at: DateTime<Utc> = modified.into();
    Some(at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// In-memory exchange that records the response
///
/// Used by the HTTP host to bridge async requests into the blocking handler.
#[derive(Debug, Default)]
pub struct BufferedExchange {
    path: String,
    mount: String,
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Bytes,
    closed: bool,
}

impl BufferedExchange {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_parts(self) -> (Option<u16>, Vec<(String, String)>, Bytes) {
        (self.status, self.headers, self.body)
    }
}

impl Exchange for BufferedExchange {
    fn path(&self) -> &str {
        &self.path
    }

    fn mount_context(&self) -> &str {
        &self.mount
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn send_response(&mut self, body: Bytes, status: u16) -> Result<(), ExchangeError> {
        if self.closed {
            return Err(ExchangeError::Closed);
        }
        if self.status.is_some() {
            return Err(ExchangeError::AlreadySent);
        }
        self.status = Some(status);
        self.body = body;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
