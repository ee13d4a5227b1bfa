use crate::fetch::client::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// The header name and value are validated once at construction so that
/// `execute` cannot fail on a malformed credential.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(key)?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name: HeaderName::from_bytes(header_name.as_bytes())?,
            value,
        })
    }

    /// Socrata application token, sent as `X-App-Token` to lift anonymous throttling.
    pub fn socrata(inner: C, token: &str) -> Result<Self> {
        Self::new(inner, "X-App-Token", token)
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unused;

    #[async_trait]
    impl HttpClient for Unused {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            unreachable!("not called in these tests")
        }
    }

    #[test]
    fn test_socrata_header() {
        let client = ApiKey::socrata(Unused, "abc123").unwrap();
        assert_eq!(client.header_name.as_str(), "x-app-token");
        assert!(client.value.is_sensitive());
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        assert!(ApiKey::new(Unused, "X-App-Token", "bad\nvalue").is_err());
        assert!(ApiKey::new(Unused, "bad header", "value").is_err());
    }
}
