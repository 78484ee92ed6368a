//! HTTP access for the discovery engine.
//!
//! One shared client per engine. Every request is SSRF-checked, bounded in
//! size, and run under the caller's [`FetchContext`].

use std::net::IpAddr;

use reqwest::header::{HeaderMap, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use super::cancel::FetchContext;
use super::error::FetchError;
use crate::config::DiscoveryConfig;
use crate::source::CacheValidators;
use crate::{NewsdeskError, Result};

/// Result of a (possibly conditional) GET.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResponse {
    /// 304: the cached copy is still current.
    NotModified,
    Body {
        bytes: Vec<u8>,
        last_modified: Option<String>,
        etag: Option<String>,
        /// URL after redirects.
        final_url: Url,
    },
}

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct Page {
    pub html: String,
    pub url: Url,
}

/// Shared HTTP client with SSRF and size protections.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_response_bytes: u64,
    allow_private_hosts: bool,
}

impl HttpFetcher {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let max_redirects = config.max_redirects;
        let allow_private_hosts = config.allow_private_hosts;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                attempt.error("too many redirects")
            } else if !allow_private_hosts && validate_url(attempt.url().as_str()).is_err() {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .redirect(redirect)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NewsdeskError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
            allow_private_hosts,
        })
    }

    /// Parse a URL and apply the SSRF rules unless private hosts are allowed.
    pub fn check_url(&self, url: &str) -> std::result::Result<Url, FetchError> {
        if self.allow_private_hosts {
            let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
            match parsed.scheme() {
                "http" | "https" => Ok(parsed),
                scheme => Err(FetchError::InvalidUrl(format!(
                    "unsupported URL scheme: {scheme}"
                ))),
            }
        } else {
            validate_url(url)
        }
    }

    /// GET `url`, sending cache validators as conditional headers.
    pub async fn get(
        &self,
        ctx: &FetchContext,
        url: &str,
        cache: Option<&CacheValidators>,
    ) -> std::result::Result<FetchResponse, FetchError> {
        let url = self.check_url(url)?;
        debug!("GET {}", url);

        ctx.guard(async {
            let mut request = self.client.get(url.clone());
            if let Some(cache) = cache {
                if let Some(last_modified) = &cache.last_modified {
                    request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
                }
                if let Some(etag) = &cache.etag {
                    request = request.header(IF_NONE_MATCH, etag.as_str());
                }
            }

            let mut response = request.send().await?;
            let status = response.status();
            if status == StatusCode::NOT_MODIFIED {
                return Ok(FetchResponse::NotModified);
            }
            if !status.is_success() {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                });
            }

            let limit = self.max_response_bytes;
            if let Some(size) = response.content_length() {
                if size > limit {
                    return Err(FetchError::TooLarge { size, limit });
                }
            }

            let last_modified = header_value(response.headers(), LAST_MODIFIED);
            let etag = header_value(response.headers(), ETAG);
            let final_url = response.url().clone();

            let mut bytes = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                bytes.extend_from_slice(&chunk);
                if bytes.len() as u64 > limit {
                    return Err(FetchError::TooLarge {
                        size: bytes.len() as u64,
                        limit,
                    });
                }
            }

            Ok(FetchResponse::Body {
                bytes,
                last_modified,
                etag,
                final_url,
            })
        })
        .await
    }

    /// GET an HTML page unconditionally.
    pub async fn get_page(
        &self,
        ctx: &FetchContext,
        url: &str,
    ) -> std::result::Result<Page, FetchError> {
        match self.get(ctx, url, None).await? {
            FetchResponse::Body {
                bytes, final_url, ..
            } => Ok(Page {
                html: String::from_utf8_lossy(&bytes).into_owned(),
                url: final_url,
            }),
            FetchResponse::NotModified => Err(FetchError::Http {
                status: StatusCode::NOT_MODIFIED.as_u16(),
            }),
        }
    }
}

fn header_value(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validate a URL for SSRF protection.
///
/// Only http(s) is accepted, and the host must not be a loopback, private,
/// link-local or otherwise internal address or hostname.
pub fn validate_url(url: &str) -> std::result::Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }

    let ip = match parsed.host() {
        None => return Err(FetchError::InvalidUrl("URL has no host".to_string())),
        Some(url::Host::Domain(domain)) => {
            if is_forbidden_hostname(domain) {
                return Err(FetchError::InvalidUrl(format!("forbidden host: {domain}")));
            }
            None
        }
        Some(url::Host::Ipv4(v4)) => Some(IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => Some(IpAddr::V6(v6)),
    };

    if let Some(ip) = ip.filter(is_private_ip) {
        return Err(FetchError::InvalidUrl(format!(
            "private IP address not allowed: {ip}"
        )));
    }

    Ok(parsed)
}

const FORBIDDEN_SUFFIXES: &[&str] = &[
    ".local",
    ".localhost",
    ".internal",
    ".intranet",
    ".corp",
    ".home",
    ".lan",
];

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|s| host.ends_with(s))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // Documentation ranges
                || (a, b, c) == (192, 0, 2)
                || (a, b, c) == (198, 51, 100)
                || (a, b, c) == (203, 0, 113)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique local fc00::/7
                || (first & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (first & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}
