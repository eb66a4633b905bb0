//! Template loader abstraction (design note: "Template loader
//! abstraction"). An interface `Load(name) -> source | not-found`, with
//! an in-memory map implementation used by tests and by callers that
//! only ever need `include`-free rendering.

use std::collections::HashMap;

pub trait Loader {
    fn load(&self, name: &str) -> Option<String>;
}

/// No templates available; `extends`/`include` always fail to resolve.
pub struct NullLoader;

impl Loader for NullLoader {
    fn load(&self, _name: &str) -> Option<String> {
        None
    }
}

#[derive(Default, Clone)]
pub struct MapLoader {
    sources: HashMap<String, String>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.sources.insert(name.into(), source.into());
        self
    }
}

impl Loader for MapLoader {
    fn load(&self, name: &str) -> Option<String> {
        self.sources.get(name).cloned()
    }
}

/// Resolves template `extends`/`include` names against a search path
/// of directories, in order — the filesystem-backed counterpart to
/// `MapLoader` used by the CLI.
pub struct DirLoader {
    dirs: Vec<std::path::PathBuf>,
}

impl DirLoader {
    pub fn new(dirs: Vec<std::path::PathBuf>) -> Self {
        DirLoader { dirs }
    }
}

impl Loader for DirLoader {
    fn load(&self, name: &str) -> Option<String> {
        for dir in &self.dirs {
            let candidate = dir.join(name);
            if let Ok(content) = std::fs::read_to_string(&candidate) {
                return Some(content);
            }
        }
        None
    }
}
