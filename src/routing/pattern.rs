//! Route pattern compilation
//!
//! Patterns are literal paths with `:name` placeholders, e.g.
//! `/users/:id/posts/:post_id`. Each placeholder matches one or more
//! characters up to the next `/`, and the compiled expression is anchored
//! at both ends: `/users/:id` matches `/users/42` but neither `/users/42/`
//! nor `/users/42/edit`.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-zA-Z0-9_]+)").expect("placeholder regex is valid"));

/// An anchored matcher plus its placeholder names in capture order
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl CompiledPattern {
    /// Compile a route pattern
    ///
    /// Fails with [`Error::InvalidPattern`] for a `:` that is not followed by
    /// a placeholder name and for a placeholder name used twice.
    pub fn compile(pattern: &str) -> Result<Self> {
        let mut expression = String::with_capacity(pattern.len() + 16);
        let mut param_names: Vec<String> = Vec::new();
        let mut literal_start = 0;

        expression.push('^');
        for caps in PLACEHOLDER.captures_iter(pattern) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            push_literal(&mut expression, pattern, &pattern[literal_start..whole.start()])?;

            let name = name.as_str();
            if param_names.iter().any(|existing| existing == name) {
                return Err(Error::invalid_pattern(
                    pattern,
                    format!("placeholder ':{}' appears more than once", name),
                ));
            }
            param_names.push(name.to_string());
            expression.push_str("([^/]+)");

            literal_start = whole.end();
        }
        push_literal(&mut expression, pattern, &pattern[literal_start..])?;
        expression.push('$');

        let regex = Regex::new(&expression)
            .map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            param_names,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and zip the captured groups with the placeholder names
    ///
    /// Matching runs on the raw path, so `%2F` never splits a segment.
    /// Captured values are percent-decoded; a value that does not decode to
    /// UTF-8 is kept as sent.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;

        let params = self
            .param_names
            .iter()
            .zip(caps.iter().skip(1))
            .filter_map(|(name, value)| value.map(|v| (name.clone(), decode_segment(v.as_str()))))
            .collect();

        Some(params)
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// The pattern as registered
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn decode_segment(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            log::debug!("Route param '{}' is not valid UTF-8 once decoded", raw);
            raw.to_string()
        }
    }
}

fn push_literal(expression: &mut String, pattern: &str, literal: &str) -> Result<()> {
    if literal.contains(':') {
        return Err(Error::invalid_pattern(
            pattern,
            "':' must be followed by a placeholder name",
        ));
    }
    expression.push_str(&regex::escape(literal));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = CompiledPattern::compile("/about").unwrap();
        assert!(pattern.param_names().is_empty());
        assert!(pattern.is_match("/about"));
        assert!(!pattern.is_match("/about/"));
        assert!(!pattern.is_match("/about/team"));
        assert!(!pattern.is_match("/aboutus"));
    }

    #[test]
    fn test_placeholders_in_order() {
        let pattern = CompiledPattern::compile("/users/:id/posts/:post_id").unwrap();
        assert_eq!(pattern.param_names(), &["id".to_string(), "post_id".to_string()]);

        let params = pattern.captures("/users/42/posts/7").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["post_id"], "7");
    }

    #[test]
    fn test_placeholder_does_not_cross_segments() {
        let pattern = CompiledPattern::compile("/files/:name").unwrap();
        assert!(pattern.captures("/files/a/b").is_none());
        assert!(pattern.captures("/files/").is_none());
        assert_eq!(pattern.captures("/files/report.pdf").unwrap()["name"], "report.pdf");
    }

    #[test]
    fn test_literal_dots_are_escaped() {
        let pattern = CompiledPattern::compile("/feed.xml").unwrap();
        assert!(pattern.is_match("/feed.xml"));
        assert!(!pattern.is_match("/feedxxml"));
    }

    #[test]
    fn test_placeholder_inside_segment() {
        let pattern = CompiledPattern::compile("/archive/:year-:month").unwrap();
        let params = pattern.captures("/archive/2024-05").unwrap();
        assert_eq!(params["year"], "2024");
        assert_eq!(params["month"], "05");
    }

    #[test]
    fn test_captured_values_are_percent_decoded() {
        let pattern = CompiledPattern::compile("/users/:name").unwrap();
        assert_eq!(pattern.captures("/users/J%C3%B6rg").unwrap()["name"], "Jörg");
        assert_eq!(pattern.captures("/users/a%2Fb").unwrap()["name"], "a/b");
        assert_eq!(pattern.captures("/users/plain+name").unwrap()["name"], "plain+name");
        assert_eq!(pattern.captures("/users/bad%FF").unwrap()["name"], "bad%FF");
    }

    #[test]
    fn test_bare_colon_is_rejected() {
        let err = CompiledPattern::compile("/users/:").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));

        assert!(CompiledPattern::compile("/a/:-b").is_err());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = CompiledPattern::compile("/a/:id/b/:id").unwrap_err();
        assert!(err.to_string().contains(":id"));
    }
}
