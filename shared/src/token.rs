use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use url::form_urlencoded;

pub const FORM_TOKEN_PARAM: &str = "formToken";

/// Opaque session token. Passed to the backend verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FormToken(String);

impl FormToken {
    /// Blank tokens are treated as absent.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the token from a full page URL: query string first, then the
    /// fragment read as the same `key=value&...` format.
    pub fn from_url(url: &str) -> Option<Self> {
        let (before_fragment, fragment) = match url.split_once('#') {
            Some((head, fragment)) => (head, Some(fragment)),
            None => (url, None),
        };
        let query = before_fragment.split_once('?').map(|(_, query)| query);

        Self::from_parts(query, fragment)
    }

    pub fn from_parts(query: Option<&str>, fragment: Option<&str>) -> Option<Self> {
        query
            .into_iter()
            .chain(fragment)
            .find_map(|source| first_param(source, FORM_TOKEN_PARAM).and_then(Self::new))
    }

    /// Resolve from parameters the HTTP layer has already decoded.
    pub fn from_query_map(params: &HashMap<String, String>) -> Option<Self> {
        params.get(FORM_TOKEN_PARAM).cloned().and_then(Self::new)
    }
}

impl fmt::Display for FormToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First value for `key` in a `a=1&b=2` string, percent-decoded.
fn first_param(source: &str, key: &str) -> Option<String> {
    let source = source.trim_start_matches(['?', '#']);
    form_urlencoded::parse(source.as_bytes())
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}
