//! Site origin.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Errors for an unusable origin.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("invalid URL: {0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme `{0}`, expected http or https")]
    Scheme(String),
}

/// The site origin every network endpoint hangs off.
///
/// Only `http` and `https` origins are accepted, so endpoint paths can always
/// be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(Url);

impl Origin {
    /// Parse an origin such as `https://shop.example.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not http(s).
    pub fn parse(raw: &str) -> Result<Self, OriginError> {
        let url = Url::parse(raw.trim())?;
        match url.scheme() {
            "http" | "https" => Ok(Self(url)),
            other => Err(OriginError::Scheme(other.to_string())),
        }
    }

    /// URL of an endpoint below the origin. Segments are percent-encoded.
    #[must_use]
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.0.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    #[must_use]
    pub const fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_segments() {
        let origin = Origin::parse("https://shop.example.com").unwrap();
        assert_eq!(
            origin.endpoint(&["api", "orders"]).as_str(),
            "https://shop.example.com/api/orders"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encodes() {
        let origin = Origin::parse("https://example.com/store/?x=1").unwrap();
        assert_eq!(
            origin.endpoint(&["events", "orders", "a/b c"]).as_str(),
            "https://example.com/store/events/orders/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejects_non_http() {
        assert!(matches!(
            Origin::parse("mailto:shop@example.com"),
            Err(OriginError::Scheme(_))
        ));
        assert!(Origin::parse("not a url").is_err());
    }
}
