//! HTTP transport seam.
//!
//! The fetcher only needs "GET this URL, give me a status and a body". Keeping
//! that behind a trait lets tests script responses without a network.

use std::error::Error as StdError;
use std::io::{self, Read};
use std::time::Duration;
use thiserror::Error;

/// Connect and read timeouts for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
        }
    }
}

/// Request-level failures, before any status code is seen.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Status line and streaming body of a response.
pub struct Response {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Anything that can issue a blocking GET.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<Response, TransportError> {
        (**self).get(url)
    }
}

/// Production transport over a blocking reqwest client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// `timeouts.read` bounds each wait on the server: the response head and
    /// every read of the body. A slow but steady download is never cut off.
    pub fn new(timeouts: Timeouts) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.read)
            .user_agent(concat!("taxistage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(Box::new(e)))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Response, TransportError> {
        let resp = self.client.get(url).send().map_err(classify)?;
        Ok(Response {
            status: resp.status().as_u16(),
            content_length: resp.content_length(),
            body: Box::new(resp),
        })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() || is_dropped_connection(&e) {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(Box::new(e))
    }
}

/// True when the peer closed or reset an established connection before the
/// response head arrived. reqwest only flags failures while connecting.
fn is_dropped_connection(e: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(e);
    while let Some(err) = current {
        if let Some(h) = err.downcast_ref::<hyper::Error>() {
            if h.is_incomplete_message() || h.is_closed() {
                return true;
            }
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.connect, Duration::from_secs(10));
        assert_eq!(t.read, Duration::from_secs(30));
    }

    #[derive(Debug, Error)]
    #[error("send request")]
    struct Wrapped(#[source] io::Error);

    #[test]
    fn reset_anywhere_in_chain_is_dropped_connection() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(is_dropped_connection(&reset));
        let wrapped = Wrapped(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(is_dropped_connection(&wrapped));
        let other = Wrapped(io::Error::new(io::ErrorKind::InvalidData, "bad header"));
        assert!(!is_dropped_connection(&other));
    }

    #[test]
    fn connection_refused_is_transient() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = HttpTransport::new(Timeouts {
            connect: Duration::from_secs(2),
            read: Duration::from_secs(2),
        })
        .unwrap();
        let err = transport
            .get(&format!("http://127.0.0.1:{port}/file.parquet"))
            .unwrap_err();
        assert!(
            matches!(err, TransportError::Connect(_) | TransportError::Timeout(_)),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn malformed_url_is_unclassified() {
        let transport = HttpTransport::new(Timeouts::default()).unwrap();
        let err = transport.get("http://[::1").unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }
}
