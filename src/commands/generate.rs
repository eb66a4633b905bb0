//! `neuroforge generate <recipe>`: prints the rendered Dockerfile to
//! stdout (§6).

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;

use neuroforge::config::BuilderConfig;
use neuroforge::model::BuildFile;
use neuroforge::template::DirLoader;

pub fn run(recipe_path: &Path, config_path: &Path) -> Result<()> {
    let cfg = BuilderConfig::load(config_path).context("loading builder.config.yaml")?;
    let src = std::fs::read_to_string(recipe_path)
        .with_context(|| format!("reading recipe {}", recipe_path.display()))?;
    let build_file =
        BuildFile::from_yaml(&src).with_context(|| format!("parsing recipe {}", recipe_path.display()))?;

    let loader = DirLoader::new(cfg.include_dirs.clone());
    let generated = neuroforge::generate(&build_file, cfg.include_dirs, IndexMap::new(), &loader)
        .with_context(|| format!("generating Dockerfile for {}", recipe_path.display()))?;

    print!("{}", generated.dockerfile);
    Ok(())
}
