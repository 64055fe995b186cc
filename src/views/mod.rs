use crate::config::ViewConfig;
use crate::error::Result;
use serde_json::Value;
use std::path::Path;

pub mod handlebars;

pub use self::handlebars::HandlebarsEngine;

/// Payload key holding the session CSRF token during a render
pub const CSRF_TOKEN_KEY: &str = "csrf_token";

/// `<input type="hidden" name="_token" ...>` for an already escaped token
pub(crate) fn hidden_token_field(token: &str) -> String {
    format!(r#"<input type="hidden" name="_token" value="{}">"#, token)
}

/// `<meta name="csrf-token" ...>` for an already escaped token
pub(crate) fn token_meta_tag(token: &str) -> String {
    format!(r#"<meta name="csrf-token" content="{}">"#, token)
}

/// Template engine contract used by the request context
pub trait TemplateRenderer: Send + Sync {
    /// Render `view`, then wrap the result in `layout`
    fn render_with_layout(&self, view: &str, layout: &str, data: &Value) -> Result<String>;

    /// Render `view` on its own
    fn render_without_layout(&self, view: &str, data: &Value) -> Result<String>;
}

/// Which layout wraps a rendered view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// The engine's default layout, or none if it has no default
    Default,
    Named(String),
    None,
}

impl Layout {
    /// `"remove"` means no layout, `""` the default one, anything else a name
    pub fn from_arg(arg: &str) -> Self {
        match arg {
            "remove" => Layout::None,
            "" => Layout::Default,
            name => Layout::Named(name.to_string()),
        }
    }
}

/// Renderer plus default layout, shared by every request
pub struct ViewEngine {
    engine: Box<dyn TemplateRenderer>,
    default_layout: Option<String>,
}

impl ViewEngine {
    pub fn new(engine: impl TemplateRenderer + 'static) -> Self {
        Self {
            engine: Box::new(engine),
            default_layout: None,
        }
    }

    pub fn with_default_layout(mut self, layout: impl Into<String>) -> Self {
        let layout = layout.into();
        self.default_layout = (!layout.is_empty()).then_some(layout);
        self
    }

    /// Handlebars engine over `config.directory`
    pub fn from_config(config: &ViewConfig) -> Result<Self> {
        let engine = HandlebarsEngine::from_directory(Path::new(&config.directory), &config.extension)?;
        Ok(Self::new(engine).with_default_layout(config.default_layout.as_str()))
    }

    pub fn default_layout(&self) -> Option<&str> {
        self.default_layout.as_deref()
    }

    pub fn render(&self, view: &str, layout: Layout, data: &Value) -> Result<String> {
        let layout = match layout {
            Layout::Named(name) => Some(name),
            Layout::Default => self.default_layout.clone(),
            Layout::None => None,
        };

        match layout {
            Some(layout) => self.engine.render_with_layout(view, &layout, data),
            None => self.engine.render_without_layout(view, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Echoes which template pair was asked for
    struct Echo;

    impl TemplateRenderer for Echo {
        fn render_with_layout(&self, view: &str, layout: &str, _data: &Value) -> Result<String> {
            Ok(format!("{}>{}", layout, view))
        }

        fn render_without_layout(&self, view: &str, _data: &Value) -> Result<String> {
            Ok(view.to_string())
        }
    }

    #[test]
    fn test_layout_arguments() {
        assert_eq!(Layout::from_arg("remove"), Layout::None);
        assert_eq!(Layout::from_arg(""), Layout::Default);
        assert_eq!(
            Layout::from_arg("layouts/admin"),
            Layout::Named("layouts/admin".to_string())
        );
    }

    #[test]
    fn test_layout_resolution() {
        let data = json!({});
        let views = ViewEngine::new(Echo).with_default_layout("layouts/app");

        assert_eq!(views.render("home", Layout::Default, &data).unwrap(), "layouts/app>home");
        assert_eq!(
            views.render("home", Layout::Named("layouts/bare".into()), &data).unwrap(),
            "layouts/bare>home"
        );
        assert_eq!(views.render("home", Layout::None, &data).unwrap(), "home");

        let plain = ViewEngine::new(Echo);
        assert_eq!(plain.default_layout(), None);
        assert_eq!(plain.render("home", Layout::Default, &data).unwrap(), "home");
    }
}
