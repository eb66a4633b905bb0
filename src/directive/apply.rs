//! The directive apply semantics (§4.1): each `Action` variant mutates
//! a `BuildContext` and/or appends to its IR builder. `apply_directive`
//! is the total function paired with `Directive::action`'s validation.

use std::path::PathBuf;

use indexmap::IndexMap;

use super::kinds::{GLOBAL_MOUNT_POINTS, LL_SCRIPT};
use crate::context::{BuildContext, TestRecord};
use crate::error::{RecipeError, Result};
use crate::expr::value::to_json;
use crate::ir::IrDirective;
use crate::model::{Action, DeployEntry, Directive, FileEntry, IncludeFile, PackageManager, TemplateRef, TestEntry};
use crate::staging::{FileOrigin, FileSource};
use crate::template::Loader;

/// §9 open question #1: `condition` is honored universally, for every
/// directive kind, not just some source code paths. A falsy condition
/// skips the directive with no change to IR, variables, files, or
/// deploys.
fn condition_holds(directive: &Directive, ctx: &BuildContext) -> Result<bool> {
    match &directive.condition {
        None => Ok(true),
        Some(src) => {
            let expr = crate::expr::parse(src)?;
            Ok(crate::expr::eval(&expr, ctx)?.is_truthy())
        }
    }
}

pub fn apply_directives(directives: &[Directive], ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    for directive in directives {
        apply_directive(directive, ctx, loader)?;
    }
    Ok(())
}

pub fn apply_directive(directive: &Directive, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    if !condition_holds(directive, ctx)? {
        return Ok(());
    }
    match directive.action()? {
        Action::Run(templates) => apply_run(&templates, ctx, loader),
        Action::Install(templates) => apply_install(&templates, ctx, loader),
        Action::Environment(map) => apply_environment(&map, ctx, loader),
        Action::User(tmpl) => {
            let value = ctx.evaluate(&tmpl, loader)?;
            ctx.ir = ctx.ir.add(IrDirective::User(value));
            Ok(())
        }
        Action::Workdir(tmpl) => {
            let value = ctx.evaluate(&tmpl, loader)?;
            ctx.ir = ctx.ir.add(IrDirective::Workdir(value));
            Ok(())
        }
        Action::Entrypoint(tmpl) => {
            let value = ctx.evaluate(&tmpl, loader)?;
            ctx.ir = ctx.ir.add(IrDirective::Entrypoint(value));
            Ok(())
        }
        Action::File(entry) => apply_file(&entry, ctx, loader),
        Action::Deploy(entry) => apply_deploy(&entry, ctx, loader),
        Action::Test(entry) => apply_test(&entry, ctx),
        Action::Template(tref) => apply_template(&tref, ctx, loader),
        Action::Include(path) => apply_include(&path, ctx, loader),
        Action::Copy(templates) => apply_copy(&templates, ctx, loader),
        Action::Variables(map) => apply_variables(&map, ctx, loader),
        Action::Boutique(value) => apply_boutique(&value, ctx, loader),
        Action::Script { inline, file } => apply_script(inline, file, ctx),
        Action::Group(inner) => apply_group(&inner, &directive.with, ctx, loader),
    }
}

/// Shell-tokenizes `rendered`, mapping a split failure to a
/// `DirectiveError` per the §7 taxonomy ("invalid shell word split").
fn shell_split(rendered: &str) -> Result<Vec<String>> {
    shell_words::split(rendered)
        .map_err(|e| RecipeError::directive(format!("invalid shell word split in {rendered:?}: {e}")))
}

fn apply_run(templates: &[String], ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    ctx.reset_mount_refs();
    let mut rendered = Vec::with_capacity(templates.len());
    for tmpl in templates {
        rendered.push(ctx.evaluate(tmpl, loader)?);
    }
    let command = rendered.join(" &&\n ");
    let mounts = ctx.taken_mount_refs();
    ctx.ir = if mounts.is_empty() {
        ctx.ir.add(IrDirective::Run(command))
    } else {
        ctx.ir.add(IrDirective::RunWithMounts { mounts, command })
    };
    Ok(())
}

fn apply_install(templates: &[String], ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let mut pkgs = Vec::new();
    for tmpl in templates {
        let rendered = ctx.evaluate(tmpl, loader)?;
        pkgs.extend(shell_split(&rendered)?);
    }
    ctx.install_packages(&pkgs)
}

fn apply_environment(map: &IndexMap<String, String>, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let mut env = IndexMap::new();
    for (key, tmpl) in map {
        if key.contains("{{") || key.contains("{%") {
            return Err(RecipeError::schema(
                "environment",
                format!("environment keys must be literal, got templated key {key:?}"),
            ));
        }
        env.insert(key.clone(), ctx.evaluate(tmpl, loader)?);
    }
    ctx.ir = ctx.ir.add(IrDirective::Env(env));
    Ok(())
}

fn apply_file(entry: &FileEntry, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let kinds = entry.filename.is_some() as u8 + entry.url.is_some() as u8 + entry.contents.is_some() as u8;
    if kinds != 1 {
        return Err(RecipeError::schema(
            "file",
            format!("file {:?} must set exactly one of filename/url/contents", entry.name),
        ));
    }
    let name = ctx.evaluate(&entry.name, loader)?;
    let origin = if let Some(path) = &entry.filename {
        FileOrigin::Local(ctx.evaluate(path, loader)?)
    } else if let Some(url) = &entry.url {
        FileOrigin::Url {
            url: ctx.evaluate(url, loader)?,
            insecure: entry.insecure,
            retry: entry.retry,
        }
    } else {
        let contents = entry.contents.as_ref().expect("kinds == 1 guarantees one of the three is Some");
        FileOrigin::Literal(ctx.evaluate(contents, loader)?)
    };
    ctx.add_file(FileSource {
        name,
        executable: entry.executable,
        origin,
    })
}

fn apply_deploy(entry: &DeployEntry, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    for bin in &entry.bins {
        let rendered = ctx.evaluate(bin, loader)?;
        ctx.deploy_bins.push(rendered);
    }
    for path in &entry.path {
        let rendered = ctx.evaluate(path, loader)?;
        ctx.deploy_paths.push(rendered);
    }
    Ok(())
}

fn apply_test(entry: &TestEntry, ctx: &mut BuildContext) -> Result<()> {
    ctx.tests.push(match entry {
        TestEntry::Builtin(name) => TestRecord::Builtin(name.clone()),
        TestEntry::Script { executable, script } => TestRecord::Script {
            executable: executable.clone(),
            script: script.clone(),
        },
    });
    Ok(())
}

fn apply_template(tref: &TemplateRef, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let (environment, instructions) = crate::templatepack::resolve(&tref.name, &tref.binaries, ctx, loader)?;
    if !environment.is_empty() {
        ctx.ir = ctx.ir.add(IrDirective::Env(environment));
    }
    if !instructions.trim().is_empty() {
        ctx.ir = ctx.ir.add(IrDirective::Run(instructions));
    }
    Ok(())
}

/// Scans `include_dirs` in order for an existing `path` (§4.4: "literal
/// (no templating) path resolved against include directories").
fn resolve_include_path(path: &str, include_dirs: &[PathBuf]) -> Result<PathBuf> {
    for dir in include_dirs {
        let candidate = dir.join(path);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(RecipeError::directive(format!("unresolved include {path:?}")))
}

fn apply_include(path: &str, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let resolved = resolve_include_path(path, &ctx.include_dirs)?;
    let content = std::fs::read_to_string(&resolved)?;
    let include_file = IncludeFile::from_yaml(&content)?;
    apply_group(&include_file.directives, &IndexMap::new(), ctx, loader)
}

fn apply_copy(templates: &[String], ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let mut tokens = Vec::new();
    for tmpl in templates {
        let rendered = ctx.evaluate(tmpl, loader)?;
        tokens.extend(shell_split(&rendered)?);
    }
    if tokens.len() < 2 {
        return Err(RecipeError::lowering("COPY requires at least one source and a destination"));
    }
    let dest = tokens.pop().expect("length checked above");
    ctx.ir = ctx.ir.add(IrDirective::Copy { sources: tokens, dest });
    Ok(())
}

/// §4.1/§9: bounded fixed-point over ≤2·N passes with stable
/// (lexicographic) key ordering, breaking on no progress and surfacing
/// the last evaluation error if variables remain unresolved.
fn apply_variables(map: &IndexMap<String, serde_yml::Value>, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let mut entries: Vec<(&String, &serde_yml::Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let max_passes = 2 * entries.len().max(1);
    let mut last_err: Option<RecipeError> = None;
    for _ in 0..max_passes {
        if entries.is_empty() {
            break;
        }
        let mut remaining = Vec::new();
        let mut progressed = false;
        for (name, raw) in entries {
            match ctx.evaluate_value(raw, loader) {
                Ok(value) => {
                    ctx.set_variable(name, value);
                    progressed = true;
                }
                Err(e) => {
                    last_err = Some(e);
                    remaining.push((name, raw));
                }
            }
        }
        entries = remaining;
        if !progressed {
            break;
        }
    }
    if !entries.is_empty() {
        return Err(last_err.unwrap_or_else(|| RecipeError::evaluation("unresolved variables")));
    }
    Ok(())
}

fn apply_boutique(value: &serde_yml::Value, ctx: &mut BuildContext, loader: &dyn Loader) -> Result<()> {
    let evaluated = ctx.evaluate_value(value, loader)?;
    let json = to_json(&evaluated);
    let contents = serde_json::to_string_pretty(&json)?;
    ctx.ir = ctx.ir.add(IrDirective::LiteralFile {
        path: "/boutique.json".to_string(),
        contents,
        executable: false,
    });
    Ok(())
}

fn apply_script(inline: Option<String>, file: Option<String>, ctx: &mut BuildContext) -> Result<()> {
    let src = if let Some(inline) = inline {
        inline
    } else if let Some(path) = file {
        if path.contains("{{") || path.contains("{%") {
            return Err(RecipeError::schema("script_file", "script file path must not contain template markers"));
        }
        let resolved = resolve_include_path(&path, &ctx.include_dirs)?;
        std::fs::read_to_string(resolved)?
    } else {
        return Err(RecipeError::directive("script directive requires `script` or `script_file`"));
    };

    crate::script::run(&src, ctx)?;

    // §4.6 post-execution: flush accumulated run commands, preserving order.
    let commands = std::mem::take(&mut ctx.run_commands);
    for cmd in commands {
        ctx.ir = ctx.ir.add(IrDirective::Run(cmd));
    }

    // Flush `_starlark_env_*` variables as one ENV block, then drop them
    // from the variable map.
    let overrides = ctx.take_env_overrides();
    if !overrides.is_empty() {
        let mut env = IndexMap::new();
        for (key, value) in overrides {
            env.insert(key, value.render());
        }
        ctx.ir = ctx.ir.add(IrDirective::Env(env));
    }
    Ok(())
}

/// §4.4 group: runs `directives` in a child context seeded with the
/// rendered `with` values, then propagates builder/run-command state
/// unconditionally and new variables/files only where the parent does
/// not already define them.
fn apply_group(
    directives: &[Directive],
    with: &IndexMap<String, serde_yml::Value>,
    ctx: &mut BuildContext,
    loader: &dyn Loader,
) -> Result<()> {
    let mut seeded = IndexMap::new();
    for (key, raw) in with {
        seeded.insert(key.clone(), ctx.evaluate_value(raw, loader)?);
    }
    let mut child = ctx.child(seeded);
    apply_directives(directives, &mut child, loader)?;
    ctx.absorb_child(&child);
    Ok(())
}

/// §4.3 top-level generation, steps 4-8 (steps 1-3 and 9-10 are driven
/// by `recipe::generate`, which seeds variables/files before calling
/// this and applies the recipe's own directives/deploy ENV after).
pub fn seed_header(
    ctx: &mut BuildContext,
    base_image: &str,
    add_default_template: bool,
    add_tzdata: bool,
    fix_locale_def: bool,
    loader: &dyn Loader,
) -> Result<()> {
    // Step 4: FROM.
    let image = ctx.evaluate(base_image, loader)?;
    ctx.ir = ctx.ir.add(IrDirective::From(image));

    // Step 5: force USER root.
    ctx.ir = ctx.ir.add(IrDirective::User("root".to_string()));

    // Step 6: default `_header` template pack, method=source.
    if add_default_template {
        let mut params = IndexMap::new();
        params.insert("method".to_string(), serde_yml::Value::String("source".to_string()));
        params.insert("fix_locale_def".to_string(), serde_yml::Value::Bool(fix_locale_def));
        let (environment, instructions) = crate::templatepack::resolve("_header", &params, ctx, loader)?;
        if !environment.is_empty() {
            ctx.ir = ctx.ir.add(IrDirective::Env(environment));
        }
        if !instructions.trim().is_empty() {
            ctx.ir = ctx.ir.add(IrDirective::Run(instructions));
        }
    }

    // Step 7: `/usr/bin/ll` writer (mode 0755 covers "chmod +x") and the
    // global mount-points `mkdir -p`.
    ctx.ir = ctx.ir.add(IrDirective::LiteralFile {
        path: "/usr/bin/ll".to_string(),
        contents: LL_SCRIPT.to_string(),
        executable: true,
    });
    ctx.ir = ctx.ir.add(IrDirective::Run(format!("mkdir -p {}", GLOBAL_MOUNT_POINTS.join(" "))));

    // Step 8: tzdata, apt only.
    if add_tzdata && matches!(ctx.package_manager, PackageManager::Apt) {
        let mut env = IndexMap::new();
        env.insert("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string());
        env.insert("TZ".to_string(), "UTC".to_string());
        ctx.ir = ctx.ir.add(IrDirective::Env(env));
        ctx.install_packages(&["tzdata".to_string()])?;
        ctx.ir = ctx
            .ir
            .add(IrDirective::Run("ln -fs /usr/share/zoneinfo/UTC /etc/localtime".to_string()));
    }

    Ok(())
}
