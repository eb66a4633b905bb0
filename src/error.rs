//! Error taxonomy for the recipe compiler core.
//!
//! Mirrors the kinds (not type names) enumerated in the design doc: every
//! component returns one of these variants, unwrapped, and only component
//! boundaries (the CLI) add a contextual prefix via `anyhow::Context`.

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecipeError>;

/// `Diagnostic` codes back the CLI's `miette`-rendered diagnostic
/// (§E1): each taxonomy kind gets a stable `neuroforge::*` code so the
/// pretty-printed report can be grepped/triaged like a compiler
/// diagnostic, not just a string.
#[derive(Error, Debug, Diagnostic)]
pub enum RecipeError {
    #[error("schema error at {path}: {message}")]
    #[diagnostic(code(neuroforge::schema), help("check the recipe field named above against the recipe schema"))]
    Schema { path: String, message: String },

    #[error("template syntax error: {message}")]
    #[diagnostic(code(neuroforge::template_syntax))]
    TemplateSyntax { message: String },

    #[error("evaluation error: {message}")]
    #[diagnostic(code(neuroforge::evaluation))]
    Evaluation { message: String },

    #[error("directive error: {message}")]
    #[diagnostic(code(neuroforge::directive))]
    Directive { message: String },

    #[error("cache error: {message}")]
    #[diagnostic(code(neuroforge::cache), help("the HTTP cache already retries transient failures; this is a persistent error"))]
    Cache { message: String },

    #[error("lowering error: {message}")]
    #[diagnostic(code(neuroforge::lowering))]
    Lowering { message: String },

    #[error("io error: {0}")]
    #[diagnostic(code(neuroforge::io))]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    #[diagnostic(code(neuroforge::yaml))]
    Yaml(#[from] serde_yml::Error),

    #[error("json error: {0}")]
    #[diagnostic(code(neuroforge::json))]
    Json(#[from] serde_json::Error),
}

impl RecipeError {
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        RecipeError::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn template_syntax(message: impl Into<String>) -> Self {
        RecipeError::TemplateSyntax {
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        RecipeError::Evaluation {
            message: message.into(),
        }
    }

    pub fn directive(message: impl Into<String>) -> Self {
        RecipeError::Directive {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        RecipeError::Cache {
            message: message.into(),
        }
    }

    pub fn lowering(message: impl Into<String>) -> Self {
        RecipeError::Lowering {
            message: message.into(),
        }
    }
}
