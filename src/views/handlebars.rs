use super::{hidden_token_field, token_meta_tag, TemplateRenderer, CSRF_TOKEN_KEY};
use crate::error::{Error, Result};
use ::handlebars::{
    html_escape, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Handlebars-backed renderer
///
/// Templates are registered under their path relative to the views
/// directory, without extension: `views/users/index.hbs` is `users/index`.
/// Layouts are ordinary templates that output the rendered view through
/// `{{{content}}}`.
pub struct HandlebarsEngine {
    handlebars: Handlebars<'static>,
}

impl Default for HandlebarsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlebarsEngine {
    /// Engine with the `csrf`, `csrf_field` and `csrf_meta` helpers
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);

        handlebars.register_helper("csrf", Box::new(csrf_helper));
        handlebars.register_helper("csrf_field", Box::new(csrf_field_helper));
        handlebars.register_helper("csrf_meta", Box::new(csrf_meta_helper));

        Self { handlebars }
    }

    /// Register every `*.{extension}` file below `dir`
    pub fn from_directory(dir: &Path, extension: &str) -> Result<Self> {
        let mut engine = Self::new();
        let extension = extension.trim_start_matches('.');

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry
                .map_err(|e| Error::template(format!("Failed to scan '{}': {}", dir.display(), e)))?;
            let path = entry.path();

            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(extension)
            {
                continue;
            }

            let Some(name) = template_name(dir, path) else {
                continue;
            };
            let source = fs::read_to_string(path).map_err(|e| {
                Error::Io(e).with_context(format!("Failed to read template '{}'", path.display()))
            })?;
            engine.register_template(&name, &source)?;
        }

        log::debug!(
            "Registered {} templates from {}",
            engine.handlebars.get_templates().len(),
            dir.display()
        );
        Ok(engine)
    }

    pub fn register_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, source)
            .map_err(|e| Error::template(format!("Template '{}' failed to compile: {}", name, e)))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    fn render_template(&self, name: &str, data: &Value) -> Result<String> {
        if !self.has_template(name) {
            return Err(Error::template(format!("Template '{}' not found", name)));
        }
        self.handlebars
            .render(name, data)
            .map_err(|e| Error::template(format!("Template '{}' failed to render: {}", name, e)))
    }
}

/// `users/index` for `<dir>/users/index.hbs`
fn template_name(dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(dir).ok()?.with_extension("");
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

// CSRF helpers read the `csrf_token` the request context puts in the payload

fn csrf_token_of(ctx: &::handlebars::Context) -> std::result::Result<String, RenderError> {
    ctx.data()
        .get(CSRF_TOKEN_KEY)
        .and_then(Value::as_str)
        .map(html_escape)
        .ok_or_else(|| RenderError::new("csrf helpers need a session-backed render"))
}

fn csrf_helper(
    _: &Helper,
    _: &Handlebars,
    ctx: &::handlebars::Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&csrf_token_of(ctx)?)?;
    Ok(())
}

fn csrf_field_helper(
    _: &Helper,
    _: &Handlebars,
    ctx: &::handlebars::Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&hidden_token_field(&csrf_token_of(ctx)?))?;
    Ok(())
}

fn csrf_meta_helper(
    _: &Helper,
    _: &Handlebars,
    ctx: &::handlebars::Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&token_meta_tag(&csrf_token_of(ctx)?))?;
    Ok(())
}

impl TemplateRenderer for HandlebarsEngine {
    fn render_with_layout(&self, view: &str, layout: &str, data: &Value) -> Result<String> {
        let content = self.render_template(view, data)?;

        let mut layout_data = match data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        layout_data.insert("content".to_string(), Value::String(content));

        self.render_template(layout, &Value::Object(layout_data))
    }

    fn render_without_layout(&self, view: &str, data: &Value) -> Result<String> {
        self.render_template(view, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn engine() -> HandlebarsEngine {
        let mut engine = HandlebarsEngine::new();
        engine
            .register_template("users/show", "<p>{{name}}</p>")
            .unwrap();
        engine
            .register_template("layouts/app", "<main>{{{content}}}</main><footer>{{name}}</footer>")
            .unwrap();
        engine
    }

    #[test]
    fn test_render_with_and_without_layout() {
        let engine = engine();
        let data = json!({"name": "Sam"});

        assert_eq!(
            engine.render_without_layout("users/show", &data).unwrap(),
            "<p>Sam</p>"
        );
        assert_eq!(
            engine
                .render_with_layout("users/show", "layouts/app", &data)
                .unwrap(),
            "<main><p>Sam</p></main><footer>Sam</footer>"
        );
    }

    #[test]
    fn test_values_are_escaped() {
        let engine = engine();
        let html = engine
            .render_without_layout("users/show", &json!({"name": "<b>"}))
            .unwrap();
        assert_eq!(html, "<p>&lt;b&gt;</p>");
    }

    #[test]
    fn test_csrf_helpers_read_the_payload_token() {
        let mut engine = HandlebarsEngine::new();
        engine
            .register_template("form", "{{csrf_meta}}|{{#each items}}{{csrf_field}}{{/each}}|{{csrf}}")
            .unwrap();

        let html = engine
            .render_without_layout("form", &json!({"csrf_token": "tok123", "items": [1]}))
            .unwrap();
        assert_eq!(
            html,
            r#"<meta name="csrf-token" content="tok123">|<input type="hidden" name="_token" value="tok123">|tok123"#
        );

        let err = engine.render_without_layout("form", &json!({"items": []})).unwrap_err();
        assert_eq!(err.error_code(), "E_TEMPLATE");
    }

    #[test]
    fn test_missing_templates_are_errors() {
        let engine = engine();
        let err = engine.render_without_layout("users/missing", &json!({})).unwrap_err();
        assert_eq!(err.error_code(), "E_TEMPLATE");

        let err = engine
            .render_with_layout("users/show", "layouts/missing", &json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("layouts/missing"));
    }

    #[test]
    fn test_from_directory_registers_nested_templates() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("users")).unwrap();
        fs::write(dir.path().join("users/index.hbs"), "{{count}} users").unwrap();
        fs::write(dir.path().join("home.hbs"), "home").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let engine = HandlebarsEngine::from_directory(dir.path(), "hbs").unwrap();
        assert!(engine.has_template("users/index"));
        assert!(engine.has_template("home"));
        assert!(!engine.has_template("notes"));
        assert_eq!(
            engine
                .render_without_layout("users/index", &json!({"count": 3}))
                .unwrap(),
            "3 users"
        );
    }
}
