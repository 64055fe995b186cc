use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub views: ViewConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub csrf: CsrfConfig,

    #[serde(default)]
    pub static_files: StaticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_views_dir")]
    pub directory: String,

    #[serde(default = "default_extension")]
    pub extension: String,

    /// Layout used when a render call passes an empty layout name
    #[serde(default = "default_layout")]
    pub default_layout: String,
}

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_enabled")]
    pub enabled: bool,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Idle timeout in seconds, also sent as the cookie Max-Age
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    #[serde(default = "default_cookie_path")]
    pub path: String,

    #[serde(default)]
    pub secure: bool,

    #[serde(default = "default_http_only")]
    pub http_only: bool,

    #[serde(default)]
    pub same_site: SameSite,

    /// Exact paths or `prefix/*` globs that never get a session
    #[serde(default)]
    pub exempt_routes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Path prefixes that never get the guard under the automatic policy
    #[serde(default = "default_exempt_prefixes")]
    pub exempt_prefixes: Vec<String>,

    #[serde(default = "default_csrf_field")]
    pub field_name: String,

    #[serde(default = "default_csrf_header")]
    pub header_name: String,

    #[serde(default = "default_min_token_length")]
    pub min_token_length: usize,

    #[serde(default = "default_csrf_message")]
    pub error_message: String,

    /// Also compare the submitted token against the one stored in the session
    #[serde(default)]
    pub verify_session_token: bool,

    #[serde(default = "default_csrf_session_key")]
    pub session_key: String,
}

impl CsrfConfig {
    pub fn is_exempt(&self, pattern: &str) -> bool {
        self.exempt_prefixes
            .iter()
            .any(|prefix| pattern.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_static_enabled")]
    pub enabled: bool,

    #[serde(default = "default_static_dir")]
    pub directory: String,

    #[serde(default = "default_static_prefix")]
    pub url_prefix: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_views_dir() -> String {
    "views".to_string()
}
fn default_extension() -> String {
    "hbs".to_string()
}
fn default_layout() -> String {
    "layouts/app".to_string()
}
fn default_session_enabled() -> bool {
    true
}
fn default_cookie_name() -> String {
    "rustf_session".to_string()
}
fn default_idle_timeout() -> u64 {
    1800
} // 30 minutes
fn default_cookie_path() -> String {
    "/".to_string()
}
fn default_http_only() -> bool {
    true
}
fn default_exempt_prefixes() -> Vec<String> {
    vec![
        "/api/".to_string(),
        "/webhook/".to_string(),
        "/health/".to_string(),
    ]
}
fn default_csrf_field() -> String {
    "_token".to_string()
}
fn default_csrf_header() -> String {
    "x-csrf-token".to_string()
}
fn default_min_token_length() -> usize {
    10
}
fn default_csrf_message() -> String {
    "CSRF token missing or invalid".to_string()
}
fn default_csrf_session_key() -> String {
    "csrf_token".to_string()
}
fn default_static_enabled() -> bool {
    true
}
fn default_static_dir() -> String {
    "public".to_string()
}
fn default_static_prefix() -> String {
    "/static".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            directory: default_views_dir(),
            extension: default_extension(),
            default_layout: default_layout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: default_session_enabled(),
            cookie_name: default_cookie_name(),
            idle_timeout: default_idle_timeout(),
            path: default_cookie_path(),
            secure: false,
            http_only: default_http_only(),
            same_site: SameSite::default(),
            exempt_routes: Vec::new(),
        }
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            exempt_prefixes: default_exempt_prefixes(),
            field_name: default_csrf_field(),
            header_name: default_csrf_header(),
            min_token_length: default_min_token_length(),
            error_message: default_csrf_message(),
            verify_session_token: false,
            session_key: default_csrf_session_key(),
        }
    }
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            enabled: default_static_enabled(),
            directory: default_static_dir(),
            url_prefix: default_static_prefix(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::Io(e).with_context(format!(
                "Failed to read config file '{}'",
                path_ref.display()
            ))
        })?;

        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded configuration from {}", path_ref.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::config("server.port must be greater than 0"));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(Error::config("session.cookie_name must not be empty"));
        }
        if self.csrf.min_token_length == 0 {
            return Err(Error::config("csrf.min_token_length must be greater than 0"));
        }
        if self.static_files.enabled && !self.static_files.url_prefix.starts_with('/') {
            return Err(Error::config("static_files.url_prefix must start with '/'"));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server_address(), "127.0.0.1:8000");
        assert_eq!(config.csrf.min_token_length, 10);
        assert_eq!(config.csrf.field_name, "_token");
        assert_eq!(config.session.same_site, SameSite::Lax);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            port = 9090

            [session]
            cookie_name = "app_sid"
            same_site = "Strict"
            exempt_routes = ["/health/*"]

            [csrf]
            exempt_prefixes = ["/api/"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session.cookie_name, "app_sid");
        assert_eq!(config.session.same_site, SameSite::Strict);
        assert_eq!(config.session.idle_timeout, 1800);
        assert!(config.csrf.is_exempt("/api/orders"));
        assert!(!config.csrf.is_exempt("/webhook/stripe"));
        assert_eq!(config.views.default_layout, "layouts/app");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AppConfig::from_toml_str("[server]\nport = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[server\nport = 1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[views]\ndirectory = \"templates\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.views.directory, "templates");

        let missing = AppConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert_eq!(missing.error_code(), "E_IO");
    }
}
