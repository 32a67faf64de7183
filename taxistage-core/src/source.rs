//! Source endpoint: where a `DatasetKey` lives upstream.

use crate::key::DatasetKey;
use std::fmt;

/// Public CloudFront distribution for TLC trip records.
pub const DEFAULT_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data/";

/// Base endpoint that file names are appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoint {
    base_url: String,
}

impl SourceEndpoint {
    /// Accepts `http` and `https` bases. A missing trailing `/` is added.
    pub fn new(base_url: &str) -> Result<Self, String> {
        let parsed =
            reqwest::Url::parse(base_url).map_err(|e| format!("invalid base url '{base_url}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "invalid base url '{base_url}': scheme must be http or https"
            ));
        }
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn location(&self, key: &DatasetKey) -> SourceLocation {
        SourceLocation(format!("{}{}", self.base_url, key.file_name()))
    }
}

impl Default for SourceEndpoint {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Full URL of one data file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation(String);

impl SourceLocation {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::TripCategory;

    #[test]
    fn default_location() {
        let key = DatasetKey::new(2023, 1, TripCategory::Yellow).unwrap();
        let loc = SourceEndpoint::default().location(&key);
        assert_eq!(
            loc.as_str(),
            "https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2023-01.parquet"
        );
    }

    #[test]
    fn trailing_slash_added() {
        let endpoint = SourceEndpoint::new("http://127.0.0.1:8080/trip-data").unwrap();
        assert_eq!(endpoint.base_url(), "http://127.0.0.1:8080/trip-data/");
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(SourceEndpoint::new("ftp://example.com/").is_err());
        assert!(SourceEndpoint::new("not a url").is_err());
    }
}
