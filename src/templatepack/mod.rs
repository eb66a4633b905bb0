//! The template pack registry (§4.1/§4.3/§4.4, §6): named packs shipped
//! in the binary, overridable by a filesystem directory. `set_template_dir`
//! mutates a process-wide value (design note §5 explicitly sanctions this
//! as the one process-wide mutable value in the system).

pub mod packs;

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use indexmap::IndexMap;

use crate::context::BuildContext;
use crate::error::{RecipeError, Result};
use crate::expr::value::Value;
use crate::model::OneOrMany;
use crate::template::Loader;
use packs::{PackVariant, TemplatePackDef, EMBEDDED_PACKS};

fn override_dir() -> &'static Mutex<Option<PathBuf>> {
    static DIR: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();
    DIR.get_or_init(|| Mutex::new(None))
}

/// Overrides the on-disk directory searched before the embedded packs.
/// Must be called before concurrent readers exist, per §5.
pub fn set_template_dir(dir: Option<PathBuf>) {
    *override_dir().lock().expect("template dir mutex poisoned") = dir;
}

fn load_pack(name: &str) -> Result<TemplatePackDef> {
    if let Some(dir) = override_dir().lock().expect("template dir mutex poisoned").clone() {
        let path = dir.join(format!("{name}.yaml"));
        if path.exists() {
            let src = std::fs::read_to_string(&path)?;
            return serde_yml::from_str(&src).map_err(RecipeError::from);
        }
    }
    for (pack_name, src) in EMBEDDED_PACKS {
        if *pack_name == name {
            return serde_yml::from_str(src).map_err(RecipeError::from);
        }
    }
    Err(RecipeError::directive(format!("unknown template pack {name:?}")))
}

/// Resolves `name` against `params`, rendering the selected variant's
/// `environment`/`instructions` against a child context seeded with
/// `params` (so `{{ version }}`/`{{ fix_locale_def }}` etc. are
/// available to the pack's templates). Returns `(environment,
/// instructions)` exactly as applied by the `template` directive: one
/// ENV block plus one RUN.
pub fn resolve(
    name: &str,
    params: &IndexMap<String, serde_yml::Value>,
    ctx: &BuildContext,
    loader: &dyn Loader,
) -> Result<(IndexMap<String, String>, String)> {
    let def = load_pack(name)?;

    let method = params.get("method").and_then(|v| v.as_str()).unwrap_or("binaries");
    let variant: &PackVariant = match method {
        "source" => def.source.as_ref().ok_or_else(|| {
            RecipeError::directive(format!("template pack {name:?} has no `source` variant"))
        })?,
        _ => def.binaries.as_ref().ok_or_else(|| {
            RecipeError::directive(format!("template pack {name:?} has no `binaries` variant"))
        })?,
    };

    let mut param_vars: IndexMap<String, Value> = IndexMap::new();
    for (key, value) in params {
        if key == "method" {
            continue;
        }
        param_vars.insert(key.clone(), crate::expr::value::from_yaml(value));
    }
    let pack_ctx = ctx.child(param_vars);

    let mut environment = IndexMap::new();
    for (key, template) in &variant.environment {
        environment.insert(key.clone(), pack_ctx.evaluate(template, loader)?);
    }

    let mut parts = Vec::new();
    if !variant.dependencies.is_empty() {
        let pm_install = match ctx.package_manager {
            crate::model::PackageManager::Apt => format!(
                "apt-get update && apt-get install -y {}",
                variant.dependencies.join(" ")
            ),
            crate::model::PackageManager::Yum => format!("yum install -y {}", variant.dependencies.join(" ")),
        };
        parts.push(pm_install);
    }
    match &variant.instructions {
        OneOrMany::One(tmpl) => parts.push(pack_ctx.evaluate(tmpl, loader)?),
        OneOrMany::Many(tmpls) => {
            for tmpl in tmpls {
                parts.push(pack_ctx.evaluate(tmpl, loader)?);
            }
        }
    }
    let instructions = parts.join(" &&\n ");

    Ok((environment, instructions))
}
