use std::fmt;

use url::Url;

/// Wildcard target origin accepted by every receiver.
pub const WILDCARD: &str = "*";

const MAX_ORIGIN_LEN: usize = 2048;

/// Origin a sender requires the receiver to match before a message is honoured.
///
/// The same value filters inbound events: a message is accepted only when the
/// origin the host reports for it equals the configured origin, unless the
/// configuration is the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetOrigin {
    /// `*`: any origin.
    Any,
    /// `scheme://host[:port]`, compared exactly.
    Exact(String),
}

impl TargetOrigin {
    /// Parse a configured target origin.
    ///
    /// Accepts `*` or a URL with nothing beyond `scheme://host[:port]` and an
    /// optional trailing `/`. The result is the origin's serialized form
    /// (lowercase scheme and host, default port dropped), which is what hosts
    /// report for inbound events. Opaque origins and userinfo are rejected
    /// because no reported origin could ever match them.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        if raw == WILDCARD {
            return Ok(Self::Any);
        }
        if raw.is_empty() || raw.len() > MAX_ORIGIN_LEN {
            return Err(format!("invalid target origin length: {}", raw.len()));
        }

        let url = Url::parse(raw).map_err(|err| format!("invalid target origin '{raw}': {err}"))?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(format!("invalid target origin '{raw}': userinfo not allowed"));
        }
        if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
            return Err(format!(
                "invalid target origin '{raw}': expected '<scheme>://<host>[:<port>]'"
            ));
        }

        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(format!("invalid target origin '{raw}': opaque origin"));
        }
        Ok(Self::Exact(origin.ascii_serialization()))
    }

    /// Returns true when a message reported from `origin` passes this filter.
    pub fn accepts(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == origin,
        }
    }

    /// Returns true for the wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// String form handed to the host's post primitive.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => WILDCARD,
            Self::Exact(origin) => origin,
        }
    }
}

impl Default for TargetOrigin {
    fn default() -> Self {
        Self::Any
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
