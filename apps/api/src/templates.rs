//! Reference templates: example designs fed to the generation prompt.
//!
//! `.html` files are used verbatim; `.pdf` files contribute their text layer.
//! Files are read in file-name order. Unreadable files are skipped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing::{info, warn};

use crate::render::text::TextExtractor;

pub async fn load_templates(dir: &Path, extractor: &dyn TextExtractor) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Cannot read template directory {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if template_kind(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        match read_template(&path, extractor).await {
            Ok(text) if !text.trim().is_empty() => templates.push(text),
            Ok(_) => warn!("Template {} is empty, skipping", path.display()),
            Err(e) => warn!("Skipping template {}: {e:#}", path.display()),
        }
    }

    info!("Loaded {} reference templates from {}", templates.len(), dir.display());
    Ok(templates)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemplateKind {
    Html,
    Pdf,
}

fn template_kind(path: &Path) -> Option<TemplateKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => Some(TemplateKind::Html),
        "pdf" => Some(TemplateKind::Pdf),
        _ => None,
    }
}

async fn read_template(path: &Path, extractor: &dyn TextExtractor) -> Result<String> {
    match template_kind(path) {
        Some(TemplateKind::Html) => Ok(tokio::fs::read_to_string(path).await?),
        Some(TemplateKind::Pdf) => {
            let bytes = tokio::fs::read(path).await?;
            Ok(extractor.extract_text(Bytes::from(bytes)).await?)
        }
        None => anyhow::bail!("unsupported template type"),
    }
}
