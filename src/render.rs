//! HTML rendering boundary
//!
//! Handlers render pages through the [`Renderer`] carried by the request
//! context. [`TemplateRenderer`] is a small implementation that substitutes
//! `{{name}}` placeholders with HTML-escaped values.

use anyhow::{Context, Result};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("template '{0}' not found")]
    NotFound(String),
    #[error("template '{0}' has an unterminated placeholder")]
    Unterminated(String),
}

pub trait Renderer: Send + Sync {
    /// Render the template `name` with `data`
    ///
    /// # Errors
    ///
    /// Returns an error if the template is unknown or malformed
    fn render(&self, name: &str, data: &HashMap<String, String>) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    templates: HashMap<String, String>,
}

impl TemplateRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_template(mut self, name: &str, source: &str) -> Self {
        self.templates.insert(name.to_string(), source.to_string());
        self
    }

    /// Load every `*.html` file in `folder`, keyed by file stem
    ///
    /// # Errors
    ///
    /// Returns an error if the folder or one of its templates cannot be read
    pub fn from_dir(folder: &Path) -> Result<Self> {
        let mut renderer = Self::new();
        let entries = fs::read_dir(folder)
            .with_context(|| format!("Failed to read template folder {}", folder.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let source = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            debug!("Loaded template '{name}'");
            renderer.templates.insert(name.to_string(), source);
        }

        Ok(renderer)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl Renderer for TemplateRenderer {
    fn render(&self, name: &str, data: &HashMap<String, String>) -> Result<String, RenderError> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| RenderError::NotFound(name.to_string()))?;

        let mut output = String::with_capacity(source.len());
        let mut rest = source.as_str();
        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| RenderError::Unterminated(name.to_string()))?;
            // Unknown placeholders render empty
            if let Some(value) = data.get(after[..end].trim()) {
                output.push_str(&escape_html(value));
            }
            rest = &after[end + 2..];
        }
        output.push_str(rest);

        Ok(output)
    }
}
