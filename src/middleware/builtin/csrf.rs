use crate::config::CsrfConfig;
use crate::context::Context;
use crate::error::Result;
use crate::http::Response;
use crate::middleware::{Middleware, Next};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hyper::StatusCode;
use rand::RngCore;
use serde_json::json;

/// Anti-forgery check for state-changing requests
///
/// The router decides which routes carry the guard; once installed it
/// checks every request except GET, HEAD and OPTIONS. The token is read
/// from the form field, then the query string, then the header.
#[derive(Debug, Clone, Default)]
pub struct CsrfGuard {
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CsrfConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    fn is_safe_method(method: &str) -> bool {
        matches!(method, "GET" | "HEAD" | "OPTIONS")
    }

    /// Submitted token, if any
    fn submitted_token(&self, ctx: &Context) -> Option<String> {
        let field = self.config.field_name.as_str();

        let from_form = ctx
            .req
            .body_as_form()
            .ok()
            .and_then(|mut form| form.remove(field));

        from_form
            .or_else(|| ctx.req.query.get(field).cloned())
            .or_else(|| ctx.req.header(&self.config.header_name).map(str::to_string))
            .filter(|token| !token.is_empty())
    }

    fn is_valid(&self, ctx: &Context, token: &str) -> bool {
        if token.len() < self.config.min_token_length {
            return false;
        }

        if !self.config.verify_session_token {
            return true;
        }

        ctx.session()
            .and_then(|session| session.get::<String>(&self.config.session_key))
            .map(|stored| constant_time_eq(stored.as_bytes(), token.as_bytes()))
            .unwrap_or(false)
    }

    fn rejection(&self, ctx: &Context) -> Result<Response> {
        let message = self.config.error_message.as_str();

        if ctx.req.is_json() {
            Ok(Response::json(json!({ "error": message }))?.with_status(StatusCode::FORBIDDEN))
        } else {
            Ok(Response::html(message).with_status(StatusCode::FORBIDDEN))
        }
    }
}

#[async_trait]
impl Middleware for CsrfGuard {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        if Self::is_safe_method(&ctx.req.method) {
            return next.run(ctx).await;
        }

        let valid = self
            .submitted_token(ctx)
            .map(|token| self.is_valid(ctx, &token))
            .unwrap_or(false);

        if !valid {
            log::debug!(
                "CSRF check failed for {} {}",
                ctx.req.method,
                ctx.req.path()
            );
            let response = self.rejection(ctx)?;
            ctx.set_response(response);
            return Ok(());
        }

        next.run(ctx).await
    }

    fn name(&self) -> &'static str {
        "csrf"
    }
}

/// 32 random bytes, URL-safe base64 without padding
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
