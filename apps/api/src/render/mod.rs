//! Rendering service: turns extracted markup into a fixed-page PDF.
//!
//! `Renderer` is the seam the pipeline depends on. The production backend shells
//! out to the `weasyprint` CLI inside a throwaway `tempfile` directory so every
//! render gets its own input, stylesheets and output path.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::layout::PageSpec;

pub mod text;

pub use text::{PdfTextExtractor, TextExtractor};

const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markup is empty; nothing to render")]
    EmptyMarkup,

    #[error("embedded resource could not be fetched: {0}")]
    ResourceFetch(String),

    #[error("rendering engine failed (exit {code:?}): {stderr}")]
    Engine { code: Option<i32>, stderr: String },

    #[error("rendering timed out after {0:?}")]
    Timeout(Duration),

    #[error("rendering I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One render request: markup plus the stylesheets and page it must fit.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub markup: String,
    /// Applied in order; later sheets win.
    pub stylesheets: Vec<String>,
    pub page: PageSpec,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: &RenderJob) -> Result<Bytes, RenderError>;
}

/// Renders through the WeasyPrint command-line tool.
#[derive(Debug, Clone)]
pub struct WeasyPrintRenderer {
    binary: PathBuf,
    timeout: Duration,
}

impl WeasyPrintRenderer {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            timeout: RENDER_TIMEOUT,
        }
    }
}

#[async_trait]
impl Renderer for WeasyPrintRenderer {
    async fn render(&self, job: &RenderJob) -> Result<Bytes, RenderError> {
        if job.markup.trim().is_empty() {
            return Err(RenderError::EmptyMarkup);
        }

        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("document.html");
        let output = workdir.path().join("document.pdf");
        tokio::fs::write(&input, &job.markup).await?;

        let mut command = tokio::process::Command::new(&self.binary);
        for (i, css) in job.stylesheets.iter().enumerate() {
            let path = workdir.path().join(format!("style-{i}.css"));
            tokio::fs::write(&path, css).await?;
            command.arg("--stylesheet").arg(path);
        }
        command
            .arg("--base-url")
            .arg(workdir.path())
            .arg(&input)
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Rendering {} bytes of markup on {}x{}in",
            job.markup.len(),
            job.page.width_in,
            job.page.height_in
        );

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(classify_failure(result.status.code(), stderr));
        }

        let pdf = tokio::fs::read(&output).await?;
        if pdf.is_empty() {
            return Err(RenderError::Engine {
                code: result.status.code(),
                stderr: "engine produced an empty document".to_string(),
            });
        }
        Ok(Bytes::from(pdf))
    }
}

/// Separates unreachable resources (images, fonts, linked CSS) from engine failures.
fn classify_failure(code: Option<i32>, stderr: String) -> RenderError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("failed to load") || lowered.contains("urlopen error") {
        RenderError::ResourceFetch(stderr)
    } else {
        RenderError::Engine { code, stderr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::default_page_spec;

    #[test]
    fn test_classify_resource_failure() {
        let err = classify_failure(
            Some(1),
            "ERROR: Failed to load image at 'https://images.example/chess.jpg'".to_string(),
        );
        assert!(matches!(err, RenderError::ResourceFetch(_)));
    }

    #[test]
    fn test_classify_engine_failure() {
        let err = classify_failure(Some(2), "Traceback: unexpected token".to_string());
        assert!(matches!(err, RenderError::Engine { code: Some(2), .. }));
    }

    #[tokio::test]
    async fn test_empty_markup_is_rejected_before_spawning() {
        let renderer = WeasyPrintRenderer::new(PathBuf::from("/nonexistent/weasyprint"));
        let job = RenderJob {
            markup: "   \n".to_string(),
            stylesheets: vec![],
            page: default_page_spec(),
        };
        let err = renderer.render(&job).await.unwrap_err();
        assert!(matches!(err, RenderError::EmptyMarkup));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_io_error() {
        let renderer = WeasyPrintRenderer::new(PathBuf::from("/nonexistent/weasyprint"));
        let job = RenderJob {
            markup: "<html><body>Chess</body></html>".to_string(),
            stylesheets: vec!["body { color: black; }".to_string()],
            page: default_page_spec(),
        };
        let err = renderer.render(&job).await.unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
