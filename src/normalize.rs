use serde::{Serialize, Serializer};
use std::fmt;

/// Canonical `http://<host>` form of a submitted URL, used as the report row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl {
    host: String,
}

impl NormalizedUrl {
    /// Lower-cases, drops the scheme, a leading `www.`, and any path, query or fragment.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        let rest = lowered
            .strip_prefix("http://")
            .or_else(|| lowered.strip_prefix("https://"))
            .unwrap_or(&lowered);

        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = authority.strip_prefix("www.").unwrap_or(authority);

        Self {
            host: host.to_string(),
        }
    }

    /// Bare host, port included when one was given.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn http(&self) -> String {
        format!("http://{}", self.host)
    }

    pub fn https(&self) -> String {
        format!("https://{}", self.host)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}", self.host)
    }
}

impl Serialize for NormalizedUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
