use thiserror::Error;

/// Errors raised while registering a route pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route pattern must not be empty")]
    EmptyPattern,

    #[error("wildcard segment '{segment}' must be the last segment of '{pattern}'")]
    WildcardNotLast { pattern: String, segment: String },

    #[error("segment '{segment}' of '{pattern}' has no parameter name")]
    UnnamedParam { pattern: String, segment: String },
}

impl RouteError {
    pub fn wildcard_not_last<P: ToString, S: ToString>(pattern: P, segment: S) -> Self {
        Self::WildcardNotLast { pattern: pattern.to_string(), segment: segment.to_string() }
    }

    pub fn unnamed_param<P: ToString, S: ToString>(pattern: P, segment: S) -> Self {
        Self::UnnamedParam { pattern: pattern.to_string(), segment: segment.to_string() }
    }
}

/// Errors raised by the typed binders on [`crate::Context`].
#[derive(Error, Debug)]
pub enum BindError {
    #[error("request has no query string")]
    MissingQuery,

    #[error("invalid query string: {source}")]
    Query {
        #[from]
        source: serde_qs::Error,
    },

    #[error("invalid form body: {source}")]
    Form {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    #[error("invalid json body: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}
