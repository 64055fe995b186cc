use crate::auth::{AuthUser, CurrentUser};
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::middleware::builtin::csrf::generate_token;
use crate::session::{Session, SessionStore};
use crate::validation::{FieldErrors, Validator};
use crate::views::{hidden_token_field, token_meta_tag, Layout, ViewEngine, CSRF_TOKEN_KEY};
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Session key holding the logged-in user record
pub const AUTH_SESSION_KEY: &str = "_auth";

const FLASH_KEY: &str = "_flash";
const OLD_KEY: &str = "_old";
const ERRORS_KEY: &str = "_errors";
const DEFAULT_ERROR_TITLE: &str = "Whoops! Something went wrong.";

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    #[serde(rename = "Flash")]
    pub message: String,
    #[serde(rename = "FlashType")]
    pub kind: String,
}

/// Per-request state threaded through middleware and the handler
///
/// Holds the parsed request, the response being built, the current user,
/// the attached session and an open value bag for middleware-to-handler
/// data. Flash messages, old input and validation errors live in the
/// session so they survive a redirect, and each is consumed by one read
/// or one successful render.
pub struct Context {
    pub req: Request,
    pub res: Option<Response>,
    pub user: CurrentUser,
    views: Option<Arc<ViewEngine>>,
    values: Mutex<Map<String, Value>>,
    session: Option<Arc<Session>>,
    session_store: Option<SessionStore>,
    flash: Option<FlashMessage>,
    csrf_session_key: String,
}

impl Context {
    pub fn new(request: Request, views: Option<Arc<ViewEngine>>) -> Self {
        Self {
            req: request,
            res: Some(Response::ok()),
            user: CurrentUser::Anonymous,
            views,
            values: Mutex::new(Map::new()),
            session: None,
            session_store: None,
            flash: None,
            csrf_session_key: "csrf_token".to_string(),
        }
    }

    pub(crate) fn set_csrf_session_key(&mut self, key: &str) {
        self.csrf_session_key = key.to_string();
    }

    // Response management

    pub fn set_response(&mut self, response: Response) {
        self.res = Some(response);
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.res.take()
    }

    pub fn response_mut(&mut self) -> &mut Response {
        self.res.get_or_insert_with(Response::ok)
    }

    // Value bag

    fn values_lock(&self) -> Result<MutexGuard<'_, Map<String, Value>>> {
        self.values
            .lock()
            .map_err(|_| Error::internal("Context value lock poisoned"))
    }

    /// Store a value, replacing any previous one under `key`
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.values_lock()?.insert(key.to_string(), value);
        Ok(())
    }

    /// Typed read, `None` when absent or of another shape
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.value(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values_lock().ok()?.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values_lock().ok()?.remove(key)
    }

    // Input

    pub fn param(&self, key: &str) -> Option<&str> {
        self.req.params.get(key).map(String::as_str)
    }

    pub fn str_param(&self, key: &str) -> Result<String> {
        self.param(key)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInput(format!("Missing route parameter '{}'", key)))
    }

    pub fn int_param(&self, key: &str) -> Result<i64> {
        let raw = self.str_param(key)?;
        raw.parse().map_err(|_| {
            Error::InvalidInput(format!("Route parameter '{}' is not an integer: {}", key, raw))
        })
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.req.query.get(key).map(String::as_str)
    }

    pub fn body_form(&self) -> Result<HashMap<String, String>> {
        self.req.body_as_form()
    }

    /// Form field, then query parameter, then route parameter
    pub fn input(&self, key: &str) -> Option<String> {
        self.body_form()
            .ok()
            .and_then(|mut form| form.remove(key))
            .or_else(|| self.query(key).map(str::to_string))
            .or_else(|| self.param(key).map(str::to_string))
    }

    /// Every input value, with the same precedence as [`Context::input`]
    pub fn all_input(&self) -> HashMap<String, String> {
        let mut all = self.req.params.clone();
        all.extend(self.req.query.clone());
        match self.body_form() {
            Ok(form) => all.extend(form),
            Err(e) => log::debug!("Ignoring unreadable form body: {}", e),
        }
        all
    }

    // Session

    pub fn attach_session(&mut self, session: Arc<Session>, store: SessionStore) {
        self.session = Some(session);
        self.session_store = Some(store);
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }

    pub fn require_session(&self) -> Result<&Session> {
        self.session()
            .ok_or_else(|| Error::session("No session attached to this request"))
    }

    /// Persist the session now instead of waiting for the session middleware
    pub async fn save_session(&self) -> Result<()> {
        match (&self.session, &self.session_store) {
            (Some(session), Some(store)) => store.save(session).await,
            _ => Err(Error::session("No session attached to this request")),
        }
    }

    // Flash messages

    pub fn set_flash(&mut self, kind: &str, message: impl Into<String>) -> Result<()> {
        let flash = FlashMessage {
            message: message.into(),
            kind: kind.to_string(),
        };
        self.require_session()?.set(FLASH_KEY, &flash)?;
        self.flash = Some(flash);
        Ok(())
    }

    /// Read and delete the stored flash message
    pub fn get_flash(&mut self) -> Option<FlashMessage> {
        let value = self.session()?.remove(FLASH_KEY)?;
        let flash: FlashMessage = serde_json::from_value(value).ok()?;
        self.flash = Some(flash.clone());
        Some(flash)
    }

    pub fn flash_success(&mut self, message: impl Into<String>) -> Result<()> {
        self.set_flash("success", message)
    }

    pub fn flash_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.set_flash("error", message)
    }

    pub fn flash_info(&mut self, message: impl Into<String>) -> Result<()> {
        self.set_flash("info", message)
    }

    pub fn flash_warning(&mut self, message: impl Into<String>) -> Result<()> {
        self.set_flash("warning", message)
    }

    /// Flash validation errors as an HTML list
    ///
    /// Nothing is stored for an empty map. Messages are listed in field
    /// order and HTML-escaped.
    pub fn set_flash_errors(&mut self, errors: &FieldErrors, title: Option<&str>) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }

        let title = title.filter(|t| !t.is_empty()).unwrap_or(DEFAULT_ERROR_TITLE);
        let sorted: BTreeMap<_, _> = errors.iter().collect();

        let mut message = format!("<strong>{}</strong><ul>", ::handlebars::html_escape(title));
        for error in sorted.values() {
            message.push_str(&format!("<li>{}</li>", ::handlebars::html_escape(error)));
        }
        message.push_str("</ul>");

        self.set_flash("error", message)
    }

    // Old input

    /// Remember one submitted value for the next render
    pub fn set_old(&self, field: &str, value: impl Into<String>) -> Result<()> {
        let session = self.require_session()?;
        let mut old = self.old_input();
        old.insert(field.to_string(), value.into());
        session.set(OLD_KEY, old)
    }

    /// Remember many submitted values, keeping ones already stored
    pub fn set_old_input(&self, input: &HashMap<String, String>) -> Result<()> {
        let session = self.require_session()?;
        let mut old = self.old_input();
        old.extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));
        session.set(OLD_KEY, old)
    }

    pub fn get_old(&self, field: &str) -> Option<String> {
        self.old_input().remove(field)
    }

    pub fn old_input(&self) -> HashMap<String, String> {
        self.session()
            .and_then(|session| session.get(OLD_KEY))
            .unwrap_or_default()
    }

    // Validation errors

    pub fn set_errors(&self, errors: &FieldErrors) -> Result<()> {
        self.require_session()?.set(ERRORS_KEY, errors)
    }

    /// Read and delete the stored validation errors
    pub fn get_errors(&self) -> FieldErrors {
        self.session()
            .and_then(|session| session.remove(ERRORS_KEY))
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Consumes the stored errors, like [`Context::get_errors`]
    pub fn has_error(&self, field: &str) -> bool {
        self.get_errors().contains_key(field)
    }

    /// Consumes the stored errors, like [`Context::get_errors`]
    pub fn error_msg(&self, field: &str) -> Option<String> {
        self.get_errors().remove(field)
    }

    /// Run a validator over all input
    ///
    /// On failure the errors and the submitted input are stored for the
    /// next render and `false` is returned.
    pub fn validate(
        &self,
        validator: &dyn Validator,
        rules: &HashMap<String, String>,
    ) -> Result<bool> {
        let input = self.all_input();
        let errors = validator.validate(rules, &input);
        if errors.is_empty() {
            return Ok(true);
        }

        if self.session.is_some() {
            self.set_errors(&errors)?;
            self.set_old_input(&input)?;
        } else {
            log::debug!("Validation failed without a session, errors are not kept");
        }
        Ok(false)
    }

    // Rendering

    /// Render a view with status 200
    ///
    /// `layout` is `"remove"` for no layout, `""` for the default layout or
    /// a layout template name.
    pub fn view(&mut self, name: &str, data: Value, layout: &str) -> Result<()> {
        self.render(StatusCode::OK, name, data, layout)
    }

    pub fn render(&mut self, status: StatusCode, name: &str, data: Value, layout: &str) -> Result<()> {
        let views = self
            .views
            .clone()
            .ok_or_else(|| Error::template("template engine not configured"))?;

        let payload = self.render_payload(data)?;
        let html = views.render(name, Layout::from_arg(layout), &payload)?;

        self.clear_one_shot();
        self.set_response(Response::html(html).with_status(status));
        Ok(())
    }

    /// Render a view without layout or context data
    pub fn render_partial(&mut self, status: StatusCode, name: &str, data: Value) -> Result<()> {
        let views = self
            .views
            .clone()
            .ok_or_else(|| Error::template("template engine not configured"))?;

        let html = views.render(name, Layout::None, &data)?;
        self.set_response(Response::html(html).with_status(status));
        Ok(())
    }

    /// Template data: context defaults, then the value bag, then `data`
    fn render_payload(&self, data: Value) -> Result<Value> {
        let flash = self.flash.clone().or_else(|| {
            self.session()
                .and_then(|session| session.get::<FlashMessage>(FLASH_KEY))
        });
        let errors: FieldErrors = self
            .session()
            .and_then(|session| session.get(ERRORS_KEY))
            .unwrap_or_default();

        let mut payload = Map::new();
        payload.insert("User".to_string(), self.user.to_value());
        payload.insert(
            "Flash".to_string(),
            Value::from(flash.as_ref().map(|f| f.message.as_str()).unwrap_or("")),
        );
        payload.insert(
            "FlashType".to_string(),
            Value::from(flash.as_ref().map(|f| f.kind.as_str()).unwrap_or("")),
        );
        payload.insert("Errors".to_string(), serde_json::to_value(errors)?);
        payload.insert("Old".to_string(), serde_json::to_value(self.old_input())?);
        if self.session().is_some() {
            payload.insert(CSRF_TOKEN_KEY.to_string(), Value::from(self.csrf_token()?));
        }

        payload.extend(self.values_lock()?.clone());

        match data {
            Value::Object(map) => payload.extend(map),
            Value::Null => {}
            other => {
                payload.insert("Data".to_string(), other);
            }
        }

        Ok(Value::Object(payload))
    }

    fn clear_one_shot(&mut self) {
        self.flash = None;
        if let Some(session) = self.session() {
            session.remove(FLASH_KEY);
            session.remove(ERRORS_KEY);
            session.remove(OLD_KEY);
        }
    }

    // Current user

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn set_user(&mut self, user: CurrentUser) {
        self.user = user;
    }

    pub fn auth(&self) -> Option<&AuthUser> {
        self.user.auth()
    }

    pub fn check(&self) -> bool {
        self.user.is_authenticated()
    }

    pub fn guest(&self) -> bool {
        !self.check()
    }

    pub fn id(&self) -> Option<u64> {
        self.user.id()
    }

    /// Store the user in the session and make it current
    pub fn login(&mut self, user: AuthUser) -> Result<()> {
        self.require_session()?.set(AUTH_SESSION_KEY, &user)?;
        log::debug!("User {} logged in", user.id);
        self.user = CurrentUser::Authenticated(user);
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        if let Some(session) = self.session() {
            session.remove(AUTH_SESSION_KEY);
        }
        self.user = CurrentUser::Anonymous;
        Ok(())
    }

    // CSRF

    /// Session CSRF token, created on first use
    pub fn csrf_token(&self) -> Result<String> {
        let session = self.require_session()?;
        if let Some(token) = session.get::<String>(&self.csrf_session_key) {
            return Ok(token);
        }

        let token = generate_token();
        session.set(&self.csrf_session_key, &token)?;
        Ok(token)
    }

    /// Hidden form input carrying the CSRF token
    pub fn csrf_field(&self) -> Result<String> {
        Ok(hidden_token_field(&self.csrf_token()?))
    }

    /// `<meta name="csrf-token">` tag for scripts sending the header
    pub fn csrf_meta(&self) -> Result<String> {
        Ok(token_meta_tag(&self.csrf_token()?))
    }

    // Response helpers

    pub fn status(&mut self, status: StatusCode) {
        self.response_mut().status = status;
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.response_mut().add_header(name, value);
    }

    /// Request header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.req.header(name)
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.req.cookie(name)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str, max_age: i64, path: &str) {
        let cookie = format!(
            "{}={}; Path={}; Max-Age={}; HttpOnly",
            name, value, path, max_age
        );
        self.add_header("Set-Cookie", &cookie);
    }

    pub fn delete_cookie(&mut self, name: &str, path: &str) {
        self.set_cookie(name, "", 0, path);
    }

    pub fn json<T: Serialize>(&mut self, data: T) -> Result<()> {
        let status = self.res.as_ref().map(|r| r.status).unwrap_or(StatusCode::OK);
        self.set_response(Response::json(data)?.with_status(status));
        Ok(())
    }

    pub fn html(&mut self, content: impl Into<String>) -> Result<()> {
        let status = self.res.as_ref().map(|r| r.status).unwrap_or(StatusCode::OK);
        self.set_response(Response::html(content).with_status(status));
        Ok(())
    }

    pub fn text(&mut self, content: impl Into<String>) -> Result<()> {
        let status = self.res.as_ref().map(|r| r.status).unwrap_or(StatusCode::OK);
        self.set_response(Response::text(content).with_status(status));
        Ok(())
    }

    /// 302 redirect
    pub fn redirect(&mut self, location: &str) -> Result<()> {
        self.set_response(Response::redirect(location));
        Ok(())
    }

    /// Redirect to the Referer, or `fallback` without one
    pub fn redirect_back(&mut self, fallback: &str) -> Result<()> {
        let target = self
            .req
            .referrer()
            .filter(|r| !r.is_empty())
            .unwrap_or(fallback)
            .to_string();
        self.redirect(&target)
    }

    pub fn not_found(&mut self) -> Result<()> {
        self.set_response(Response::not_found());
        Ok(())
    }

    pub fn forbidden(&mut self, message: Option<&str>) -> Result<()> {
        self.set_response(Response::forbidden(message));
        Ok(())
    }
}
