use super::Handler;
use crate::context::Context;
use crate::error::Result;
use crate::http::Response;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Serves files from a directory for routes ending in `:filepath`
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a request path onto the root, refusing anything that could escape it
    fn sanitize_and_join(base: &Path, candidate: &str) -> Option<PathBuf> {
        if candidate.is_empty() {
            return None;
        }

        let mut clean = PathBuf::new();
        for component in Path::new(candidate).components() {
            match component {
                Component::Normal(segment) => {
                    // dotfiles stay private
                    if segment.to_string_lossy().starts_with('.') {
                        return None;
                    }
                    clean.push(segment);
                }
                Component::CurDir => continue,
                _ => return None,
            }
        }

        if clean.as_os_str().is_empty() {
            return None;
        }
        Some(base.join(clean))
    }
}

#[async_trait]
impl Handler for StaticFiles {
    async fn call(&self, ctx: &mut Context) -> Result<()> {
        let requested = ctx.param("filepath").unwrap_or_default();

        let Some(path) = Self::sanitize_and_join(&self.root, requested) else {
            log::warn!("Rejected static file request for '{}'", requested);
            ctx.set_response(Response::forbidden(None));
            return Ok(());
        };

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                let content = tokio::fs::read(&path).await?;
                let content_type = Response::guess_content_type(&path);
                ctx.set_response(
                    Response::ok()
                        .with_header("Content-Type", content_type)
                        .with_body(content),
                );
            }
            Ok(_) => ctx.set_response(Response::not_found()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ctx.set_response(Response::not_found())
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }
}
