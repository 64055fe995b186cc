use super::multipart::{boundary_of, MultipartForm};
use crate::error::{Error, Result};
use hyper::{Body, Request as HyperRequest};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Request {
    pub method: String,
    pub uri: String,
    /// Header names are stored lower-cased
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    body_bytes: Vec<u8>,
}

impl Request {
    /// Create a new Request without going through hyper
    ///
    /// Mostly useful for tests and for driving `Router::dispatch` directly.
    pub fn new(method: &str, uri: &str) -> Self {
        let query = match uri.split_once('?') {
            Some((_, query)) => Self::parse_query(query),
            None => HashMap::new(),
        };

        Request {
            method: method.to_uppercase(),
            uri: uri.to_string(),
            headers: HashMap::new(),
            params: HashMap::new(),
            query,
            body_bytes: Vec::new(),
        }
    }

    /// Builder-style header setter, name is lower-cased
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    /// Builder-style body setter
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body_bytes = body.into();
        self
    }

    #[doc(hidden)]
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body_bytes = body;
    }

    pub async fn from_hyper(req: HyperRequest<Body>) -> Result<Self> {
        let method = req.method().to_string();
        let uri = req.uri().to_string();

        let mut headers = HashMap::new();
        for (name, value) in req.headers() {
            if let Ok(value_str) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), value_str.to_string());
            }
        }

        let query = Self::parse_query(req.uri().query().unwrap_or(""));

        let body_bytes = hyper::body::to_bytes(req.into_body()).await?.to_vec();

        Ok(Request {
            method,
            uri,
            headers,
            params: HashMap::new(), // filled by the router
            query,
            body_bytes,
        })
    }

    pub fn body_as_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body_bytes).map_err(Error::Json)
    }

    /// Form fields of an urlencoded or `multipart/form-data` body
    ///
    /// Multipart file parts are left out, see [`Request::multipart`]. JSON
    /// and empty bodies yield an empty map.
    pub fn body_as_form(&self) -> Result<HashMap<String, String>> {
        if self.body_bytes.is_empty() || self.is_json() {
            return Ok(HashMap::new());
        }
        if self.is_multipart() {
            return Ok(self.multipart()?.map(|form| form.fields).unwrap_or_default());
        }

        let body = std::str::from_utf8(&self.body_bytes)
            .map_err(|e| Error::InvalidInput(format!("Form body is not valid UTF-8: {}", e)))?;
        Ok(Self::parse_query(body))
    }

    /// Parse a `multipart/*` body, `None` for any other content type
    pub fn multipart(&self) -> Result<Option<MultipartForm>> {
        if !self.is_multipart() {
            return Ok(None);
        }

        let boundary = self
            .content_type()
            .and_then(boundary_of)
            .ok_or_else(|| Error::InvalidInput("multipart request without boundary".to_string()))?;
        MultipartForm::parse(&self.body_bytes, &boundary).map(Some)
    }

    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body_bytes).to_string()
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
        let mut result = HashMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match (decode_component(key), decode_component(value)) {
                (Some(k), Some(v)) => {
                    result.insert(k, v);
                }
                (Some(k), None) => {
                    log::debug!("Dropping undecodable value for form field '{}'", k);
                    result.insert(k, String::new());
                }
                _ => log::debug!("Skipping undecodable form pair"),
            }
        }
        result
    }

    /// Get request path from URI, without the query string
    pub fn path(&self) -> &str {
        let without_query = match self.uri.find('?') {
            Some(idx) => &self.uri[..idx],
            None => &self.uri,
        };

        // absolute-form URIs (proxies) carry scheme and authority
        match without_query.find("://") {
            Some(scheme_end) => {
                let after_scheme = &without_query[scheme_end + 3..];
                match after_scheme.find('/') {
                    Some(path_start) => &after_scheme[path_start..],
                    None => "/",
                }
            }
            None => without_query,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// True when the request declares a JSON body
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.trim().to_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }

    fn is_multipart(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_lowercase().starts_with("multipart/"))
            .unwrap_or(false)
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.headers.get("cookie")?;
        header.split(';').find_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
    }

    pub fn referrer(&self) -> Option<&str> {
        self.header("referer")
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// Client IP, honouring X-Forwarded-For and X-Real-IP
    pub fn client_ip(&self) -> String {
        if let Some(forwarded) = self.headers.get("x-forwarded-for") {
            if let Some(first_ip) = forwarded.split(',').next() {
                return first_ip.trim().to_string();
            }
        }

        if let Some(real_ip) = self.headers.get("x-real-ip") {
            return real_ip.to_string();
        }

        "127.0.0.1".to_string()
    }

    pub fn is_xhr(&self) -> bool {
        self.header("x-requested-with")
            .map(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
            .unwrap_or(false)
    }
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}
