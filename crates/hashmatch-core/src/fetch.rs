//! Remote fetcher: single HTTP(S) GET streamed into a sink.
//!
//! Uses the curl crate (libcurl). The transfer is bounded by libcurl's own
//! connect and total timeouts; there is no retry. Runs in the current
//! thread; call from `spawn_blocking` if used from async code.

use crate::config::HashmatchConfig;
use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;

const MAX_REDIRECTS: u32 = 10;

/// Why a remote fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Locator is not an absolute http(s) URL.
    #[error("invalid remote URL ({url}): {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Connection, DNS, TLS or timeout failure before a response arrived.
    #[error("failed to fetch remote file ({url}): {source}")]
    Network {
        url: String,
        #[source]
        source: curl::Error,
    },
    /// Remote answered with something other than 200.
    #[error("remote returned HTTP status {code} - {}", status_text(.code, .reason))]
    BadStatus {
        url: String,
        code: u32,
        reason: String,
    },
    /// Response started but the body could not be read to the end.
    #[error("failed to read remote file body ({url}): {source}")]
    BodyRead {
        url: String,
        #[source]
        source: io::Error,
    },
}

fn status_text(code: &u32, reason: &str) -> String {
    if reason.is_empty() {
        code.to_string()
    } else {
        format!("{} {}", code, reason)
    }
}

impl FetchError {
    /// HTTP status the verification endpoint should answer with.
    /// Remote 4xx/5xx pass through; anything else non-200 is a gateway error.
    pub fn status(&self) -> u16 {
        match self {
            FetchError::InvalidUrl { .. } | FetchError::Network { .. } => 502,
            FetchError::BadStatus { code, .. } if (400..=599).contains(code) => *code as u16,
            FetchError::BadStatus { .. } => 502,
            FetchError::BodyRead { .. } => 500,
        }
    }

    /// True for failures that happened while consuming the body, i.e. after
    /// the remote had already answered 200.
    pub fn is_body_read(&self) -> bool {
        matches!(self, FetchError::BodyRead { .. })
    }
}

/// Timeouts applied to every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&HashmatchConfig::default())
    }
}

impl From<&HashmatchConfig> for FetchOptions {
    fn from(cfg: &HashmatchConfig) -> Self {
        Self {
            timeout: cfg.fetch_timeout(),
            connect_timeout: cfg.connect_timeout(),
        }
    }
}

/// Stateless fetcher. Each call builds its own curl handle, so one value can
/// be shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteFetcher {
    opts: FetchOptions,
}

/// Status-line state collected by the header callback. With redirects
/// enabled libcurl reports every hop, so only the last block counts.
#[derive(Default)]
struct HeaderState {
    code: Cell<u32>,
    reason: RefCell<String>,
    final_headers_done: Cell<bool>,
}

impl HeaderState {
    /// Header lines are raw bytes; reason phrases may carry non-UTF-8 octets.
    fn on_line(&self, data: &[u8]) {
        let line = String::from_utf8_lossy(data);
        let line = line.trim_end();
        if line.starts_with("HTTP/") {
            let (code, reason) = parse_status_line(line);
            self.code.set(code);
            *self.reason.borrow_mut() = reason;
            self.final_headers_done.set(false);
            return;
        }
        if line.is_empty() {
            let code = self.code.get();
            // 1xx and followed redirects are followed by another block.
            let more_to_come = (100..200).contains(&code) || is_followed_redirect(code);
            if !more_to_come {
                self.final_headers_done.set(true);
            }
        }
    }
}

fn is_followed_redirect(code: u32) -> bool {
    matches!(code, 301 | 302 | 303 | 307 | 308)
}

/// "HTTP/1.1 404 Not Found" -> (404, "Not Found"). HTTP/2 has no reason phrase.
fn parse_status_line(line: &str) -> (u32, String) {
    let mut parts = line.splitn(3, ' ');
    let _version = parts.next();
    let code = parts
        .next()
        .and_then(|c| c.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let reason = parts.next().unwrap_or("").trim().to_string();
    (code, reason)
}

impl RemoteFetcher {
    pub fn new(opts: FetchOptions) -> Self {
        Self { opts }
    }

    /// GET `url` and stream a 200 body into `sink`. Returns the number of
    /// body bytes written. Non-200 bodies are never written to `sink`.
    pub fn fetch_to<W: Write>(&self, url: &str, sink: &mut W) -> Result<u64, FetchError> {
        validate_url(url)?;
        let network = |source: curl::Error| FetchError::Network {
            url: url.to_string(),
            source,
        };

        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(network)?;
        easy.get(true).map_err(network)?;
        easy.follow_location(true).map_err(network)?;
        easy.max_redirections(MAX_REDIRECTS).map_err(network)?;
        easy.connect_timeout(self.opts.connect_timeout).map_err(network)?;
        easy.timeout(self.opts.timeout).map_err(network)?;

        let headers = HeaderState::default();
        let written = Cell::new(0u64);
        let rejected_status = Cell::new(false);
        let sink_error: RefCell<Option<io::Error>> = RefCell::new(None);

        let perform_result = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    headers.on_line(data);
                    true
                })
                .map_err(network)?;
            transfer
                .write_function(|data| {
                    if headers.code.get() != 200 {
                        // Stop early; the status is reported after perform().
                        rejected_status.set(true);
                        return Ok(0);
                    }
                    match sink.write_all(data) {
                        Ok(()) => {
                            written.set(written.get() + data.len() as u64);
                            Ok(data.len())
                        }
                        Err(e) => {
                            *sink_error.borrow_mut() = Some(e);
                            Ok(0)
                        }
                    }
                })
                .map_err(network)?;
            transfer.perform()
        };

        if let Err(e) = perform_result {
            if rejected_status.get() {
                return Err(self.bad_status(url, &easy, &headers));
            }
            if let Some(io_err) = sink_error.borrow_mut().take() {
                return Err(FetchError::BodyRead {
                    url: url.to_string(),
                    source: io_err,
                });
            }
            if headers.final_headers_done.get() && headers.code.get() == 200 {
                return Err(FetchError::BodyRead {
                    url: url.to_string(),
                    source: io::Error::new(io::ErrorKind::Other, e),
                });
            }
            return Err(network(e));
        }

        let code = easy.response_code().map_err(network)?;
        if code != 200 {
            return Err(self.bad_status(url, &easy, &headers));
        }
        Ok(written.get())
    }

    fn bad_status(
        &self,
        url: &str,
        easy: &curl::easy::Easy,
        headers: &HeaderState,
    ) -> FetchError {
        let code = easy
            .response_code()
            .ok()
            .filter(|c| *c != 0)
            .unwrap_or_else(|| headers.code.get());
        FetchError::BadStatus {
            url: url.to_string(),
            code,
            reason: headers.reason.borrow().clone(),
        }
    }
}

/// Only absolute http/https URLs are fetched; libcurl would otherwise happily
/// read `file://` and friends.
fn validate_url(raw: &str) -> Result<(), FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}
