//! Secret redaction for logs and serialized output.
//!
//! [`Redacted`] prints and serializes as `"<redacted>"`; the inner value is
//! only reachable through [`Redacted::expose`].

use std::fmt::{self, Debug, Display};

/// Wrapper that hides its inner value when formatted or serialized.
///
/// ```ignore
/// use xchain_relay::redact::Redacted;
///
/// let key = Redacted::new("0xabc...".to_string());
/// tracing::info!(private_key = %key, "Signer loaded");
/// // Logs: private_key = <redacted>
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// The secret itself. Keep the result out of logs.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}

impl<T> From<T> for Redacted<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

/// Reduce a URL to `scheme://host[:port]` before logging it.
///
/// RPC providers embed API keys in userinfo, the path or the query string,
/// so none of those survive. Unparseable input is not echoed back.
pub fn redact_url(raw: &str) -> String {
    let parsed = match url::Url::parse(raw.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return "<invalid url>".to_string(),
    };
    match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{}://{}:{}", parsed.scheme(), host, port),
        (Some(host), None) => format!("{}://{}", parsed.scheme(), host),
        (None, _) => format!("{}://<no host>", parsed.scheme()),
    }
}
