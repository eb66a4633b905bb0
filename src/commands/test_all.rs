//! `neuroforge test-all` (§6): validates and renders every recipe
//! found under the configured `recipe_roots`, reporting pass/fail per
//! recipe without invoking the container builder.

use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indexmap::IndexMap;
use walkdir::WalkDir;

use neuroforge::config::BuilderConfig;
use neuroforge::model::BuildFile;
use neuroforge::template::DirLoader;

pub fn run(config_path: &Path) -> Result<()> {
    let cfg = BuilderConfig::load(config_path).context("loading builder.config.yaml")?;
    if cfg.recipe_roots.is_empty() {
        println!("{}", "no recipe_roots configured in builder.config.yaml".yellow());
        return Ok(());
    }
    let loader = DirLoader::new(cfg.include_dirs.clone());

    let mut total = 0usize;
    let mut failures = 0usize;
    for root in &cfg.recipe_roots {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_name() != "build.yaml" {
                continue;
            }
            total += 1;
            let path = entry.path();
            match render_one(path, &cfg, &loader) {
                Ok(()) => println!("{} {}", "ok".green(), path.display()),
                Err(err) => {
                    failures += 1;
                    println!("{} {}: {err:?}", "FAIL".red().bold(), path.display());
                }
            }
        }
    }

    println!("{total} recipes, {failures} failures");
    if failures > 0 {
        bail!("{failures} recipe(s) failed to generate");
    }
    Ok(())
}

fn render_one(path: &Path, cfg: &BuilderConfig, loader: &DirLoader) -> Result<()> {
    let src = std::fs::read_to_string(path)?;
    let build_file = BuildFile::from_yaml(&src)?;
    neuroforge::generate(&build_file, cfg.include_dirs.clone(), IndexMap::new(), loader)?;
    Ok(())
}
