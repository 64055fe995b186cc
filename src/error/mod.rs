use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rustf-dispatch
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("CSRF error: {0}")]
    Csrf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    // Error with context chain
    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn csrf(msg: impl Into<String>) -> Self {
        Self::Csrf(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Http(_) => "E_HTTP",
            Error::Json(_) => "E_JSON",
            Error::Template(_) => "E_TEMPLATE",
            Error::RouteNotFound(_) => "E_ROUTE_NOT_FOUND",
            Error::InvalidPattern { .. } => "E_INVALID_PATTERN",
            Error::Session(_) => "E_SESSION",
            Error::Validation(_) => "E_VALIDATION",
            Error::InvalidInput(_) => "E_INVALID_INPUT",
            Error::Csrf(_) => "E_CSRF",
            Error::Io(_) => "E_IO",
            Error::Config(_) => "E_CONFIG",
            Error::Internal(_) => "E_INTERNAL",
            Error::Authentication(_) => "E_AUTH",
            Error::Authorization(_) => "E_AUTHZ",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::InvalidInput(_) => 400,
            Error::Authentication(_) => 401,
            Error::Authorization(_) | Error::Csrf(_) => 403,
            Error::RouteNotFound(_) => 404,
            Error::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}
