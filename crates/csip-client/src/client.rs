use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use tracing::debug;

use crate::Sep2Error;

const SEP_XML: &str = "application/sep+xml";

/// Reads and writes XML resources on the utility server.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + 'static {
    async fn get(&self, href: &str, query: &[(&str, &str)]) -> Result<String, Sep2Error>;

    /// Creates a resource under `href`. Returns the `Location` of the created resource when the
    /// server reports one.
    async fn post(&self, href: &str, body: String) -> Result<Option<String>, Sep2Error>;

    /// Replaces the resource at `href`.
    async fn put(&self, href: &str, body: String) -> Result<(), Sep2Error>;
}

/// HTTP transport for the utility server. TLS and client certificates are configured on the
/// supplied `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct Sep2Client {
    http: reqwest::Client,
    host: String,
}

impl Sep2Client {
    pub fn new(http: reqwest::Client, host: impl Into<String>) -> Result<Self, Sep2Error> {
        let host = host.into();
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            return Err(Sep2Error::InvalidUrl(host));
        }
        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{}/{}", self.host, href.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl ResourceFetcher for Sep2Client {
    async fn get(&self, href: &str, query: &[(&str, &str)]) -> Result<String, Sep2Error> {
        let url = self.url(href);
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, SEP_XML)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        debug!(url = %url, bytes = body.len(), "sep2 resource fetched");
        Ok(body)
    }

    async fn post(&self, href: &str, body: String) -> Result<Option<String>, Sep2Error> {
        let url = self.url(href);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, SEP_XML)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(location_href);
        debug!(url = %url, location = ?location, "sep2 resource created");
        Ok(location)
    }

    async fn put(&self, href: &str, body: String) -> Result<(), Sep2Error> {
        let url = self.url(href);
        self.http
            .put(&url)
            .header(CONTENT_TYPE, SEP_XML)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        debug!(url = %url, "sep2 resource updated");
        Ok(())
    }
}

/// Servers may answer with an absolute `Location`; keep only the path so it joins like any href.
fn location_href(location: &str) -> String {
    let Some((_, rest)) = location.split_once("://") else {
        return location.to_string();
    };
    match rest.find('/') {
        Some(index) => rest[index..].to_string(),
        None => "/".to_string(),
    }
}
