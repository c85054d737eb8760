//! Jinja-style rendering on top of `minijinja`.
//!
//! The renderer separates failures into two classes. Soft failures (an
//! undefined name, an operation on the wrong types, a division by zero) are
//! returned as [`Rendered::Soft`] so the caller can keep the original text and
//! try again once more context exists. Everything else is a [`ConfigError`].

use crate::error::{ConfigError, ConfigResult};
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Why a template could not be rendered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftFailure {
    UndefinedReference(String),
    TypeMismatch(String),
    ZeroDivision(String),
}

impl std::fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoftFailure::UndefinedReference(m) => write!(f, "undefined reference: {}", m),
            SoftFailure::TypeMismatch(m) => write!(f, "type mismatch: {}", m),
            SoftFailure::ZeroDivision(m) => write!(f, "division by zero: {}", m),
        }
    }
}

/// Outcome of rendering a single template unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    Soft(SoftFailure),
}

/// Template renderer with the `path_join` filter registered.
pub struct Renderer {
    env: Environment<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_filter("path_join", path_join);
        Self { env }
    }

    /// Render one template unit belonging to config key `key`.
    pub fn render(&self, key: &str, source: &str, context: &Map<String, Value>) -> ConfigResult<Rendered> {
        match self.env.render_str(source, context) {
            Ok(text) if is_float_division_by_zero(source, &text) => {
                let failure = SoftFailure::ZeroDivision(source.to_string());
                debug!(key, template = source, "{}", failure);
                Ok(Rendered::Soft(failure))
            }
            Ok(text) => Ok(Rendered::Text(text)),
            Err(err) => {
                let failure = classify(key, source, &err)?;
                debug!(key, template = source, "{}", failure);
                Ok(Rendered::Soft(failure))
            }
        }
    }

    /// Render a full template text. Soft failures are errors here, since the
    /// output is consumed directly rather than stored for another pass.
    pub fn render_text(&self, name: &str, source: &str, context: &Map<String, Value>) -> ConfigResult<String> {
        self.env.render_str(source, context).map_err(|err| {
            error!(template = name, "rendering failed: {:#}", err);
            ConfigError::template(name, err.to_string())
        })
    }

    /// Render the template file at `path`.
    pub fn render_file(&self, path: &Path, context: &Map<String, Value>) -> ConfigResult<String> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        self.render_text(&path.display().to_string(), &source, context)
    }

    /// Top-level names a template refers to without defining them itself.
    pub fn undeclared_variables(&self, source: &str) -> ConfigResult<BTreeSet<String>> {
        let template = self
            .env
            .template_from_str(source)
            .map_err(|e| ConfigError::template("<template>", e.to_string()))?;
        Ok(template.undeclared_variables(false).into_iter().collect())
    }

    /// Undeclared names that `context` does not provide, sorted.
    pub fn missing_values(&self, source: &str, context: &Map<String, Value>) -> ConfigResult<Vec<String>> {
        Ok(self
            .undeclared_variables(source)?
            .into_iter()
            .filter(|name| !context.contains_key(name))
            .collect())
    }
}

/// Sort a render error into a soft failure or a fatal config error.
fn classify(key: &str, source: &str, err: &minijinja::Error) -> ConfigResult<SoftFailure> {
    let detail = err.detail().unwrap_or_default().to_string();
    match err.kind() {
        ErrorKind::UndefinedError => Ok(SoftFailure::UndefinedReference(source.to_string())),
        ErrorKind::InvalidOperation if is_zero_division(&detail) => {
            Ok(SoftFailure::ZeroDivision(source.to_string()))
        }
        ErrorKind::InvalidOperation => Ok(SoftFailure::TypeMismatch(detail)),
        ErrorKind::UnknownFilter => {
            let filter = if detail.is_empty() {
                filter_names(source).join(", ")
            } else {
                detail
            };
            error!(key, filter = %filter, "unknown filter");
            Err(ConfigError::UnknownFilter {
                filter,
                key: key.to_string(),
            })
        }
        _ => {
            error!(key, template = source, "template failed: {:#}", err);
            Err(ConfigError::template(key, err.to_string()))
        }
    }
}

fn is_zero_division(detail: &str) -> bool {
    regex_lite::Regex::new(r"(//|%|/) -?0(\.0+)?$")
        .map(|re| re.is_match(detail))
        .unwrap_or(false)
}

/// Float `/` and `%` by zero render `inf` or `NaN` instead of failing. Only
/// a template that divides can produce them this way.
fn is_float_division_by_zero(source: &str, text: &str) -> bool {
    let operators = source.replace("{%", "").replace("%}", "");
    (operators.contains('/') || operators.contains('%'))
        && matches!(text.trim(), "inf" | "-inf" | "NaN" | "nan" | "-nan")
}

fn filter_names(source: &str) -> Vec<String> {
    let Ok(re) = regex_lite::Regex::new(r"\|\s*([A-Za-z_][A-Za-z0-9_]*)") else {
        return Vec::new();
    };
    re.captures_iter(source)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Join path segments; an absolute segment discards what came before it.
fn path_join(segments: minijinja::Value) -> Result<String, minijinja::Error> {
    let mut path = PathBuf::new();
    for segment in segments.try_iter()? {
        let segment = segment
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| segment.to_string());
        path.push(segment);
    }
    Ok(path.to_string_lossy().into_owned())
}
