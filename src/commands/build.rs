//! `neuroforge build <recipe> [--local KEY=DIR]` (§6): renders the
//! Dockerfile, stages every file from the plan into `local/build/<name>
//! /cache/`, then invokes the container builder with a `cache=` named
//! context plus any user-supplied `--local` contexts.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;

use neuroforge::config::{self, BuilderConfig};
use neuroforge::httpcache::{CancelToken, HttpCache, ProgressReporter};
use neuroforge::model::BuildFile;
use neuroforge::staging::{FileOrigin, StagingPlan};
use neuroforge::template::DirLoader;

pub fn run(recipe_path: &Path, config_path: &Path, local_bindings: Vec<(String, String)>) -> Result<()> {
    let cfg = BuilderConfig::load(config_path).context("loading builder.config.yaml")?;
    let src = fs::read_to_string(recipe_path)
        .with_context(|| format!("reading recipe {}", recipe_path.display()))?;
    let build_file =
        BuildFile::from_yaml(&src).with_context(|| format!("parsing recipe {}", recipe_path.display()))?;

    let mut locals = IndexMap::new();
    for (key, dir) in &local_bindings {
        locals.insert(key.clone(), dir.clone());
    }

    let loader = DirLoader::new(cfg.include_dirs.clone());
    let generated = neuroforge::generate(&build_file, cfg.include_dirs.clone(), locals, &loader)
        .with_context(|| format!("generating Dockerfile for {}", recipe_path.display()))?;

    let build_dir = PathBuf::from("local/build").join(&build_file.name);
    let cache_dir = build_dir.join("cache");
    fs::create_dir_all(&cache_dir).with_context(|| format!("creating {}", cache_dir.display()))?;

    let dockerfile_path = build_dir.join("Dockerfile");
    fs::write(&dockerfile_path, &generated.dockerfile)
        .with_context(|| format!("writing {}", dockerfile_path.display()))?;

    stage_files(&generated.staging_plan, &cache_dir)?;

    invoke_builder(&dockerfile_path, &build_dir, &cache_dir, &local_bindings)
}

fn stage_files(plan: &StagingPlan, cache_dir: &Path) -> Result<()> {
    let http_cache_dir = config::http_cache_dir(
        dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache")).join("neuroforge"),
    );
    let http_cache = HttpCache::new(http_cache_dir).context("opening HTTP cache")?;
    let cancel = CancelToken::new();
    let verbose = config::verbose_enabled();

    for file in plan.files() {
        let dest = cache_dir.join(&file.name);
        match &file.origin {
            FileOrigin::Local(path) => {
                fs::copy(path, &dest)
                    .with_context(|| format!("staging local file {path} -> {}", dest.display()))?;
            }
            FileOrigin::Literal(contents) => {
                fs::write(&dest, contents)
                    .with_context(|| format!("staging literal file {}", dest.display()))?;
            }
            FileOrigin::Url { url, insecure, retry } => {
                let progress = ProgressReporter::new(&file.name, verbose);
                let fetched = http_cache
                    .get(url, *insecure, *retry, &cancel, progress.as_ref())
                    .with_context(|| format!("fetching {url}"))?;
                if let Some(p) = &progress {
                    p.finish();
                }
                fs::copy(&fetched.path, &dest).with_context(|| {
                    format!("staging cached download {} -> {}", fetched.path.display(), dest.display())
                })?;
            }
        }
        if file.executable {
            set_executable(&dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Invokes the container builder (external collaborator, §6) with a
/// `cache=<staging-dir>` named build context plus any user-provided
/// named contexts from `--local KEY=DIR`.
fn invoke_builder(
    dockerfile_path: &Path,
    build_dir: &Path,
    cache_dir: &Path,
    local_bindings: &[(String, String)],
) -> Result<()> {
    let mut cmd = Command::new("docker");
    cmd.arg("build")
        .arg("-f")
        .arg(dockerfile_path)
        .arg("--build-context")
        .arg(format!("cache={}", cache_dir.display()));
    for (key, dir) in local_bindings {
        cmd.arg("--build-context").arg(format!("{key}={dir}"));
    }
    cmd.arg(build_dir);

    let status = cmd
        .status()
        .context("invoking the container builder (is `docker` installed?)")?;
    if !status.success() {
        bail!("container builder exited with status {status}");
    }
    Ok(())
}
