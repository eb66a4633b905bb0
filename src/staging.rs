//! `FileSource`/`StagingPlan` (§3): the deterministic list of files the
//! external builder must place beside the Dockerfile.

use crate::error::{RecipeError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum FileOrigin {
    /// A path on the host filesystem, resolved relative to the recipe.
    Local(String),
    /// Inline literal contents (serialized straight into the plan).
    Literal(String),
    /// An HTTP(S) URL, materialized through the HTTP cache at staging
    /// time.
    Url { url: String, insecure: bool, retry: Option<u32> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    pub name: String,
    pub executable: bool,
    pub origin: FileOrigin,
}

impl FileSource {
    pub fn local(name: impl Into<String>, path: impl Into<String>) -> Self {
        FileSource {
            name: name.into(),
            executable: false,
            origin: FileOrigin::Local(path.into()),
        }
    }

    pub fn literal(name: impl Into<String>, contents: impl Into<String>) -> Self {
        FileSource {
            name: name.into(),
            executable: false,
            origin: FileOrigin::Literal(contents.into()),
        }
    }

    pub fn url(name: impl Into<String>, url: impl Into<String>, insecure: bool, retry: Option<u32>) -> Self {
        FileSource {
            name: name.into(),
            executable: false,
            origin: FileOrigin::Url { url: url.into(), insecure, retry },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedFile {
    pub name: String,
    pub executable: bool,
    pub origin: FileOrigin,
}

/// Deterministic: sorted by name regardless of registration order (§3,
/// §5).
#[derive(Debug, Clone, Default)]
pub struct StagingPlan {
    files: Vec<StagedFile>,
}

impl StagingPlan {
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a FileSource>) -> Result<Self> {
        let mut files: Vec<StagedFile> = sources
            .into_iter()
            .map(|f| StagedFile {
                name: f.name.clone(),
                executable: f.executable,
                origin: f.origin.clone(),
            })
            .collect();
        let mut seen = std::collections::HashSet::new();
        for f in &files {
            if !seen.insert(&f.name) {
                return Err(RecipeError::directive(format!("duplicate file name {:?} in staging plan", f.name)));
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(StagingPlan { files })
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_sorted_regardless_of_registration_order() {
        let sources = vec![
            FileSource::literal("z.txt", "z"),
            FileSource::literal("a.txt", "a"),
        ];
        let plan = StagingPlan::from_sources(&sources).unwrap();
        assert_eq!(plan.files()[0].name, "a.txt");
        assert_eq!(plan.files()[1].name, "z.txt");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let sources = vec![FileSource::literal("a.txt", "1"), FileSource::literal("a.txt", "2")];
        assert!(StagingPlan::from_sources(&sources).is_err());
    }
}
