//! HTTP transport over a secure session
//!
//! A thin blocking client: one `GET` at a time, status plus body back. The
//! TLS configuration comes from the session unchanged, so the HSM signs for
//! every new connection the client opens.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use super::SecureSessionConfig;
use crate::error::{HandshakeCause, MtlsError, MtlsResult, TransportError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client that uses `session` for every connection
pub fn configure_transport(session: &SecureSessionConfig) -> MtlsResult<TransportHandle> {
    let tls = session.client_config().as_ref().clone();

    let client = Client::builder()
        .use_preconfigured_tls(tls)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(TransportError::Build)?;

    debug!("HTTP transport configured");
    Ok(TransportHandle { client })
}

/// Blocking HTTP client bound to one secure session
#[derive(Clone)]
pub struct TransportHandle {
    client: Client,
}

impl TransportHandle {
    /// Issue a `GET` and read the whole body
    ///
    /// A TLS failure (including a failed HSM signature) is reported as
    /// `HandshakeFailed`, any other failure as a transport error. Non-2xx
    /// statuses are returned as responses; see
    /// [`TransportResponse::error_for_status`].
    pub fn get(&self, url: &str) -> MtlsResult<TransportResponse> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| request_error(url, e))?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|e| request_error(url, e))?;

        info!("GET {} -> {}", url, status);
        Ok(TransportResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

fn request_error(url: &str, err: reqwest::Error) -> MtlsError {
    match HandshakeCause::find_in(&err) {
        Some(cause) => MtlsError::HandshakeFailed(cause),
        None => TransportError::Request {
            url: url.to_string(),
            source: err,
        }
        .into(),
    }
}

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx status into `TransportError::UnexpectedStatus`
    pub fn error_for_status(self) -> MtlsResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::UnexpectedStatus {
                url: self.url,
                status: self.status,
            }
            .into())
        }
    }
}
