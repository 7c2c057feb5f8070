//! Endpoint URL validation.
//!
//! The negotiation endpoint receives the ephemeral credential as a bearer
//! token, so it must use HTTPS. Plain HTTP is accepted only for loopback hosts
//! (local mock servers and development proxies). The token service is usually
//! a local proxy and may use either scheme.

use std::net::IpAddr;
use thiserror::Error;
use tracing::warn;
use url::{Host, Url};

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be HTTPS, got: {0}")]
    HttpsRequired(String),

    #[error("URL scheme must be HTTP or HTTPS, got: {0}")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Whether the URL host is a loopback name or address.
pub fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            domain.eq_ignore_ascii_case("localhost")
                || domain.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn parse_with_host(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    if url.host().is_none() {
        return Err(UrlValidationError::MissingHost);
    }
    Ok(url)
}

/// Validates the negotiation endpoint URL
///
/// 1. URL must be valid and parseable
/// 2. URL must have a host
/// 3. Scheme must be HTTPS, or HTTP on a loopback host
pub fn validate_negotiation_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = parse_with_host(url_str)?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback_host(&url) => {
            warn!(url = %url, "Using plain HTTP negotiation endpoint on loopback host");
            Ok(url)
        }
        other => Err(UrlValidationError::HttpsRequired(other.to_string())),
    }
}

/// Validates the token service URL. HTTP and HTTPS are both accepted.
pub fn validate_token_service_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = parse_with_host(url_str)?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(UrlValidationError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_url_invalid_format() {
        let result = validate_negotiation_url("not a url");
        assert!(matches!(result, Err(UrlValidationError::InvalidFormat(_))));
    }

    #[test]
    fn test_negotiation_url_https_accepted() {
        let url = validate_negotiation_url("https://api.openai.com/v1/realtime").unwrap();
        assert_eq!(url.host_str(), Some("api.openai.com"));
    }

    #[test]
    fn test_negotiation_url_http_not_allowed() {
        let result = validate_negotiation_url("http://api.openai.com/v1/realtime");
        assert!(matches!(result, Err(UrlValidationError::HttpsRequired(_))));
    }

    #[test]
    fn test_negotiation_url_http_loopback_allowed() {
        assert!(validate_negotiation_url("http://localhost:8080/realtime").is_ok());
        assert!(validate_negotiation_url("http://127.0.0.1:55123/realtime").is_ok());
        assert!(validate_negotiation_url("http://[::1]:9000/").is_ok());
    }

    #[test]
    fn test_negotiation_url_other_scheme() {
        let result = validate_negotiation_url("ws://localhost/realtime");
        assert!(matches!(result, Err(UrlValidationError::HttpsRequired(_))));
    }

    #[test]
    fn test_token_service_url() {
        assert!(validate_token_service_url("http://localhost:3000/session").is_ok());
        assert!(validate_token_service_url("https://tokens.example.com/session").is_ok());
        assert!(matches!(
            validate_token_service_url("ftp://example.com/session"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_missing_host() {
        assert!(matches!(
            validate_token_service_url("unix:/var/run/token.sock"),
            Err(UrlValidationError::MissingHost)
        ));
    }
}
