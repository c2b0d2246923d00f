//! HTTP transport with redirect protection
//!
//! Redirects are followed by hand so that credentials are only ever sent to
//! the origin of the original request.

use reqwest::{Method, StatusCode};
use std::time::Duration;
use url::Url;

use crate::config::Repository;
use crate::credentials::ResolvedCredentials;
use crate::error::{RepoError, Result};

const MAX_REDIRECTS: u32 = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated HTTP(S) client bound to one repository
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    credentials: Option<ResolvedCredentials>,
}

impl HttpTransport {
    pub fn new(credentials: Option<ResolvedCredentials>, insecure_skip_tls: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            // redirects are handled in `send` so credentials never leak cross-origin
            .redirect(reqwest::redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure_skip_tls)
            .user_agent(concat!("m2cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            credentials,
        })
    }

    /// Client for a configured repository, resolving its credentials
    pub fn for_repository(repo: &Repository) -> Result<Self> {
        let credentials = repo.credentials.as_ref().map(|c| c.resolve()).transpose()?;
        Self::new(credentials, repo.insecure_skip_tls)
    }

    /// Client without credentials
    pub fn public() -> Result<Self> {
        Self::new(None, false)
    }

    pub async fn get(&self, url: &str, etag: Option<&str>) -> Result<reqwest::Response> {
        self.send(Method::GET, url, None, etag).await
    }

    pub async fn put(&self, url: &str, body: Vec<u8>) -> Result<reqwest::Response> {
        self.send(Method::PUT, url, Some(body), None).await
    }

    pub async fn delete(&self, url: &str) -> Result<reqwest::Response> {
        self.send(Method::DELETE, url, None, None).await
    }

    /// Send a request, following redirects
    ///
    /// The final response is returned whatever its status; interpreting it is
    /// up to the caller.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        etag: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.request(method.clone(), &current_url);

            if let Some(etag) = etag {
                request = request.header(reqwest::header::IF_NONE_MATCH, etag);
            }
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            if same_origin(url, &current_url) {
                if let Some(creds) = &self.credentials {
                    request = request.header(reqwest::header::AUTHORIZATION, creds.auth_header());
                }
            } else if self.credentials.is_some() {
                tracing::warn!(
                    "Cross-origin redirect from {} to {} - credentials not forwarded",
                    url,
                    current_url
                );
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() && status != StatusCode::NOT_MODIFIED {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(RepoError::NetworkError {
                        message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                    });
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                tracing::debug!("{} {} redirected to {}", method, url, current_url);
                continue;
            }

            return Ok(response);
        }
    }
}

/// Check if two URLs are same-origin (for redirect safety)
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}
