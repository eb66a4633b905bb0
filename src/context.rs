//! `BuildContext` (§3/§4.2): the mutable state threaded through
//! directive application. Variables and files resolve through a
//! parent-chain walk over `Frame`s — "implement as a linked list of
//! frames; lookup is a parent-chain walk. No cycles by construction"
//! (design note). The IR builder is a pure value type the context
//! swaps its pointer to on every append.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{RecipeError, Result};
use crate::expr::eval::Environment;
use crate::expr::value::{AttrObject, Value};
use crate::ir::{IrBuilder, IrDirective};
use crate::model::{Arch, PackageManager};
use crate::script::ScriptHost;
use crate::staging::FileSource;
use crate::template::{render_template, Loader};

const CACHE_MOUNT: &str = "type=bind,from=cache,source=/,target=/.neurocontainer-cache,readonly";
const LOCAL_MOUNT: &str = "type=bind,from=local,source=/,target=/.neurocontainer-local,readonly";

struct Frame {
    variables: Rc<RefCell<IndexMap<String, Value>>>,
    files: Rc<RefCell<IndexMap<String, FileSource>>>,
}

/// A `test` directive (§4.1): recorded as metadata only, never lowered
/// into the Dockerfile (§4.7 "Tests ... are NOT rendered").
#[derive(Debug, Clone, PartialEq)]
pub enum TestRecord {
    Builtin(String),
    Script { executable: String, script: String },
}

pub struct BuildContext {
    pub package_manager: PackageManager,
    pub version: String,
    pub original_version: String,
    pub arch: Arch,
    pub parallel_jobs: i64,
    pub include_dirs: Vec<PathBuf>,
    /// CLI-provided `--local KEY=DIR` bindings (§6), read by
    /// `has_local`/`get_local`.
    pub locals: IndexMap<String, String>,
    frames: Vec<Rc<Frame>>,
    pub run_commands: Vec<String>,
    pub deploy_bins: Vec<String>,
    pub deploy_paths: Vec<String>,
    pub tests: Vec<TestRecord>,
    pub ir: IrBuilder,
    /// Accumulates which mount kinds (`"cache"`/`"local"`) a single
    /// `run` directive's templates referenced via `get_file`/
    /// `get_local`, reset by the caller before each directive's render.
    mount_refs: Rc<RefCell<Vec<&'static str>>>,
}

impl BuildContext {
    pub fn new(package_manager: PackageManager, version: impl Into<String>, arch: Arch, include_dirs: Vec<PathBuf>) -> Self {
        let version = version.into();
        BuildContext {
            package_manager,
            original_version: version.clone(),
            version,
            arch,
            parallel_jobs: 1,
            include_dirs,
            locals: IndexMap::new(),
            frames: vec![Rc::new(Frame {
                variables: Rc::new(RefCell::new(IndexMap::new())),
                files: Rc::new(RefCell::new(IndexMap::new())),
            })],
            run_commands: Vec::new(),
            deploy_bins: Vec::new(),
            deploy_paths: Vec::new(),
            tests: Vec::new(),
            ir: IrBuilder::new(),
            mount_refs: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Creates a child context for `group`/`include` application,
    /// seeded with `with_vars`. Shares ancestor frames (cheap `Rc`
    /// clones) and carries the parent's IR/run-commands/deploy state so
    /// the child observes everything applied so far.
    pub fn child(&self, with_vars: IndexMap<String, Value>) -> Self {
        let mut frames = self.frames.clone();
        frames.push(Rc::new(Frame {
            variables: Rc::new(RefCell::new(with_vars)),
            files: Rc::new(RefCell::new(IndexMap::new())),
        }));
        BuildContext {
            package_manager: self.package_manager,
            version: self.version.clone(),
            original_version: self.original_version.clone(),
            arch: self.arch,
            parallel_jobs: self.parallel_jobs,
            include_dirs: self.include_dirs.clone(),
            locals: self.locals.clone(),
            frames,
            run_commands: self.run_commands.clone(),
            deploy_bins: self.deploy_bins.clone(),
            deploy_paths: self.deploy_paths.clone(),
            tests: self.tests.clone(),
            ir: self.ir.clone(),
            mount_refs: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// §4.4 group propagation: builder state and run commands propagate
    /// unconditionally; new variables/files propagate only if the
    /// parent does not already define them (parent wins).
    pub fn absorb_child(&mut self, child: &BuildContext) {
        self.ir = child.ir.clone();
        self.run_commands = child.run_commands.clone();
        self.deploy_bins = child.deploy_bins.clone();
        self.deploy_paths = child.deploy_paths.clone();
        self.tests = child.tests.clone();

        let child_frame = child.frames.last().expect("child always has its own frame");
        for (name, value) in child_frame.variables.borrow().iter() {
            if self.lookup_variable(name).is_none() {
                self.set_variable(name, value.clone());
            }
        }
        for (name, file) in child_frame.files.borrow().iter() {
            if self.lookup_file(name).is_none() {
                let _ = self.add_file(file.clone());
            }
        }
    }

    fn current_frame(&self) -> &Rc<Frame> {
        self.frames.last().expect("BuildContext always has at least one frame")
    }

    pub fn set_variable(&self, name: &str, value: Value) {
        self.current_frame().variables.borrow_mut().insert(name.to_string(), value);
    }

    pub fn lookup_variable(&self, name: &str) -> Option<Value> {
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.variables.borrow().get(name) {
                return Some(v.clone());
            }
        }
        None
    }

    pub fn add_file(&self, file: FileSource) -> Result<()> {
        if self.lookup_file(&file.name).is_some() {
            return Err(RecipeError::directive(format!("duplicate file name {:?}", file.name)));
        }
        self.current_frame().files.borrow_mut().insert(file.name.clone(), file);
        Ok(())
    }

    pub fn lookup_file(&self, name: &str) -> Option<FileSource> {
        for frame in self.frames.iter().rev() {
            if let Some(f) = frame.files.borrow().get(name) {
                return Some(f.clone());
            }
        }
        None
    }

    /// All files visible from this context, across the whole frame
    /// chain (used by the root context at the end of generation to
    /// build the staging plan).
    pub fn all_files(&self) -> Vec<FileSource> {
        let mut seen = IndexMap::new();
        for frame in &self.frames {
            for (name, file) in frame.files.borrow().iter() {
                seen.entry(name.clone()).or_insert_with(|| file.clone());
            }
        }
        seen.into_values().collect()
    }

    pub fn add_run_command(&mut self, cmd: impl Into<String>) {
        self.run_commands.push(cmd.into());
    }

    /// Pulls every `_starlark_env_*` variable out of the current frame,
    /// stripping the prefix, for the scripting engine's post-run ENV
    /// flush (§4.6: "removed from the variable map" afterward).
    pub fn take_env_overrides(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        let mut vars = self.current_frame().variables.borrow_mut();
        let keys: Vec<String> = vars
            .keys()
            .filter(|k| k.starts_with("_starlark_env_"))
            .cloned()
            .collect();
        for key in keys {
            if let Some(value) = vars.shift_remove(&key) {
                let stripped = key.strip_prefix("_starlark_env_").expect("filtered above").to_string();
                out.insert(stripped, value);
            }
        }
        out
    }

    pub fn install_packages(&mut self, pkgs: &[String]) -> Result<()> {
        if pkgs.is_empty() {
            return Ok(());
        }
        let cmd = match self.package_manager {
            PackageManager::Apt => format!(
                "apt-get update && apt-get install -y {} && rm -rf /var/lib/apt/lists/*",
                pkgs.join(" ")
            ),
            PackageManager::Yum => format!("yum install -y {}", pkgs.join(" ")),
        };
        self.ir = self.ir.add(IrDirective::Run(cmd));
        Ok(())
    }

    /// Clears the mount-reference accumulator before rendering a single
    /// `run` directive's templates.
    pub fn reset_mount_refs(&self) {
        self.mount_refs.borrow_mut().clear();
    }

    /// The deduplicated bind mounts referenced by the templates
    /// rendered since the last `reset_mount_refs` (§4.1).
    pub fn taken_mount_refs(&self) -> Vec<String> {
        let refs = self.mount_refs.borrow();
        let mut mounts = Vec::new();
        if refs.contains(&"cache") {
            mounts.push(CACHE_MOUNT.to_string());
        }
        if refs.contains(&"local") {
            mounts.push(LOCAL_MOUNT.to_string());
        }
        mounts
    }

    /// Renders a template string against this context (§4.2 `evaluate`
    /// for plain strings).
    pub fn evaluate(&self, template: &str, loader: &dyn Loader) -> Result<String> {
        render_template(template, self, loader)
    }

    /// Recurses into nested maps/lists and supports the `try` form
    /// (§4.2).
    pub fn evaluate_value(&self, value: &serde_yml::Value, loader: &dyn Loader) -> Result<Value> {
        match value {
            serde_yml::Value::String(s) => Ok(Value::Str(self.evaluate(s, loader)?)),
            serde_yml::Value::Sequence(seq) => {
                let mut out = Vec::with_capacity(seq.len());
                for item in seq {
                    out.push(self.evaluate_value(item, loader)?);
                }
                Ok(Value::List(out))
            }
            serde_yml::Value::Mapping(map) => {
                if map.len() == 1 {
                    if let Some(try_val) = map.get("try") {
                        return self.evaluate_try(try_val, loader);
                    }
                }
                let mut out = IndexMap::new();
                for (k, v) in map {
                    if let Some(key) = k.as_str() {
                        out.insert(key.to_string(), self.evaluate_value(v, loader)?);
                    }
                }
                Ok(Value::Dict(out))
            }
            other => Ok(crate::expr::value::from_yaml(other)),
        }
    }

    fn evaluate_try(&self, try_val: &serde_yml::Value, loader: &dyn Loader) -> Result<Value> {
        let seq = try_val
            .as_sequence()
            .ok_or_else(|| RecipeError::schema("try", "`try` must be a sequence of {condition, value}"))?;
        for entry in seq {
            let map = entry
                .as_mapping()
                .ok_or_else(|| RecipeError::schema("try", "each `try` entry must be a mapping"))?;
            let cond_src = map
                .get("condition")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RecipeError::schema("try", "each `try` entry requires a string `condition`"))?;
            let cond_expr = crate::expr::parse(cond_src)?;
            if crate::expr::eval(&cond_expr, self)?.is_truthy() {
                let value = map
                    .get("value")
                    .ok_or_else(|| RecipeError::schema("try", "matched `try` entry is missing `value`"))?;
                return self.evaluate_value(value, loader);
            }
        }
        Err(RecipeError::evaluation("no `try` branch matched"))
    }
}

#[derive(Clone)]
struct ContextView {
    variables: Rc<RefCell<IndexMap<String, Value>>>,
    version: String,
    original_version: String,
    parallel_jobs: i64,
    arch: &'static str,
    package_manager: &'static str,
}

impl std::fmt::Debug for ContextView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContextView(version={:?})", self.version)
    }
}

impl AttrObject for ContextView {
    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "version" => Some(Value::str(self.version.clone())),
            "original_version" => Some(Value::str(self.original_version.clone())),
            "parallel_jobs" => Some(Value::Int(self.parallel_jobs)),
            "arch" => Some(Value::str(self.arch)),
            "PackageManager" => Some(Value::str(self.package_manager)),
            other => self.variables.borrow().get(other).cloned(),
        }
    }
}

impl Environment for BuildContext {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "version" => return Some(Value::str(self.version.clone())),
            "original_version" => return Some(Value::str(self.original_version.clone())),
            "parallel_jobs" => return Some(Value::Int(self.parallel_jobs)),
            "arch" => return Some(Value::str(self.arch.as_str())),
            "context" | "local" => {
                return Some(Value::Object(Rc::new(ContextView {
                    variables: self.current_frame().variables.clone(),
                    version: self.version.clone(),
                    original_version: self.original_version.clone(),
                    parallel_jobs: self.parallel_jobs,
                    arch: self.arch.as_str(),
                    package_manager: self.package_manager.as_str(),
                })))
            }
            "has_local" => {
                let locals = self.locals.clone();
                return Some(Value::Callable(Rc::new(move |args: &[Value]| -> Result<Value> {
                    let key = args.first().and_then(Value::as_str).unwrap_or_default();
                    Ok(Value::Bool(locals.contains_key(key)))
                })));
            }
            "get_local" => {
                let locals = self.locals.clone();
                let mount_refs = self.mount_refs.clone();
                return Some(Value::Callable(Rc::new(move |args: &[Value]| -> Result<Value> {
                    let key = args
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| RecipeError::evaluation("get_local(key) requires a string argument"))?;
                    if !locals.contains_key(key) {
                        return Err(RecipeError::evaluation(format!("no local binding for {key:?}")));
                    }
                    mount_refs.borrow_mut().push("local");
                    Ok(Value::Str(format!("/.neurocontainer-local/{key}")))
                })));
            }
            "get_file" => {
                let files: Vec<(String, FileSource)> =
                    self.frames.iter().flat_map(|f| f.files.borrow().clone().into_iter()).collect();
                let mount_refs = self.mount_refs.clone();
                return Some(Value::Callable(Rc::new(move |args: &[Value]| -> Result<Value> {
                    let key = args
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| RecipeError::evaluation("get_file(name) requires a string argument"))?;
                    if !files.iter().any(|(name, _)| name == key) {
                        return Err(RecipeError::evaluation(format!("no file registered with name {key:?}")));
                    }
                    mount_refs.borrow_mut().push("cache");
                    Ok(Value::Str(format!("/.neurocontainer-cache/{key}")))
                })));
            }
            other => self.lookup_variable(other),
        }
    }
}

impl ScriptHost for BuildContext {
    fn variables(&self) -> Rc<RefCell<IndexMap<String, Value>>> {
        self.current_frame().variables.clone()
    }

    fn install_packages(&mut self, pkgs: &[String]) -> Result<()> {
        BuildContext::install_packages(self, pkgs)
    }

    fn run_command(&mut self, cmd: String) {
        self.add_run_command(cmd);
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        BuildContext::set_variable(self, name, value);
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn parallel_jobs(&self) -> i64 {
        self.parallel_jobs
    }

    fn package_manager(&self) -> String {
        self.package_manager.as_str().to_string()
    }

    fn arch(&self) -> String {
        self.arch.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::NullLoader;

    fn ctx() -> BuildContext {
        BuildContext::new(PackageManager::Apt, "1.0", Arch::X86_64, vec![])
    }

    #[test]
    fn variable_lookup_walks_parent_chain() {
        let mut root = ctx();
        root.set_variable("a", Value::Int(1));
        let mut with_vars = IndexMap::new();
        with_vars.insert("b".to_string(), Value::Int(2));
        let child = root.child(with_vars);
        assert_eq!(child.lookup_variable("a"), Some(Value::Int(1)));
        assert_eq!(child.lookup_variable("b"), Some(Value::Int(2)));
        assert_eq!(root.lookup_variable("b"), None);
    }

    #[test]
    fn group_propagation_parent_wins() {
        let mut root = ctx();
        root.set_variable("x", Value::Int(1));
        let mut with_vars = IndexMap::new();
        with_vars.insert("x".to_string(), Value::Int(99));
        with_vars.insert("y".to_string(), Value::Int(2));
        let child = root.child(with_vars);
        root.absorb_child(&child);
        assert_eq!(root.lookup_variable("x"), Some(Value::Int(1)));
        assert_eq!(root.lookup_variable("y"), Some(Value::Int(2)));
    }

    #[test]
    fn duplicate_file_registration_fails() {
        let ctx = ctx();
        ctx.add_file(FileSource::literal("a.txt", "1")).unwrap();
        assert!(ctx.add_file(FileSource::literal("a.txt", "2")).is_err());
    }

    #[test]
    fn get_file_records_cache_mount_reference() {
        let ctx = ctx();
        ctx.add_file(FileSource::literal("installer.bin", "xyz")).unwrap();
        ctx.reset_mount_refs();
        let rendered = ctx.evaluate("{{ get_file('installer.bin') }}", &NullLoader).unwrap();
        assert_eq!(rendered, "/.neurocontainer-cache/installer.bin");
        assert_eq!(ctx.taken_mount_refs(), vec![CACHE_MOUNT.to_string()]);
    }

    #[test]
    fn try_form_picks_first_matching_branch() {
        let ctx = ctx();
        let yaml: serde_yml::Value = serde_yml::from_str(
            r#"
try:
  - condition: "version == '2.0'"
    value: "two"
  - condition: "version == '1.0'"
    value: "one"
"#,
        )
        .unwrap();
        let result = ctx.evaluate_value(&yaml, &NullLoader).unwrap();
        assert_eq!(result, Value::Str("one".to_string()));
    }
}
