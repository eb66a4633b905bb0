//! `builder.config.yaml` (§6, §E3): recipe roots, include directories,
//! and an optional on-disk template pack override. Every field defaults
//! to empty so a missing config file is not an error.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{RecipeError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuilderConfig {
    #[serde(default)]
    pub recipe_roots: Vec<PathBuf>,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

impl BuilderConfig {
    pub fn from_yaml(src: &str) -> Result<Self> {
        serde_yml::from_str(src).map_err(RecipeError::from)
    }

    /// Loads `builder.config.yaml` from `path` if it exists, otherwise
    /// returns the all-defaults config.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(BuilderConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        BuilderConfig::from_yaml(&content)
    }
}

/// `BUILDER_HTTP_CACHE_DIR` override for the HTTP cache directory
/// (§E3); falls back to `default_dir` when unset.
pub fn http_cache_dir(default_dir: PathBuf) -> PathBuf {
    std::env::var("BUILDER_HTTP_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(default_dir)
}

/// `BUILDER_VERBOSE` gates the HTTP cache's progress reporter (§4.8
/// item 5), independent of `RUST_LOG`.
pub fn verbose_enabled() -> bool {
    std::env::var("BUILDER_VERBOSE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_empty() {
        let cfg = BuilderConfig::from_yaml("recipe_roots: [recipes]").unwrap();
        assert_eq!(cfg.recipe_roots, vec![PathBuf::from("recipes")]);
        assert!(cfg.include_dirs.is_empty());
        assert!(cfg.template_dir.is_none());
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(BuilderConfig::from_yaml("bogus: true").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = BuilderConfig::load(std::path::Path::new("/nonexistent/builder.config.yaml")).unwrap();
        assert!(cfg.recipe_roots.is_empty());
    }
}
