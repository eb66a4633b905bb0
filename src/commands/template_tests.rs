//! `neuroforge template-tests [selector...] [--print-dockerfile]` (§6):
//! resolves template packs directly (bypassing a full recipe) so pack
//! authors can iterate on `environment`/`instructions` rendering without
//! writing a throwaway recipe.

use anyhow::{Context, Result};

use neuroforge::context::BuildContext;
use neuroforge::model::{Arch, PackageManager};
use neuroforge::template::NullLoader;
use neuroforge::templatepack::{self, packs::EMBEDDED_PACKS};

pub fn run(selector: &[String], print_dockerfile: bool) -> Result<()> {
    let names: Vec<&str> = if selector.is_empty() {
        EMBEDDED_PACKS.iter().map(|(name, _)| *name).collect()
    } else {
        selector.iter().map(String::as_str).collect()
    };

    for name in names {
        let ctx = BuildContext::new(PackageManager::Apt, "0.0.0", Arch::X86_64, vec![]);
        let params = indexmap::IndexMap::new();
        let (environment, instructions) = templatepack::resolve(name, &params, &ctx, &NullLoader)
            .with_context(|| format!("resolving template pack {name:?}"))?;

        println!("== {name} ==");
        if print_dockerfile {
            for (key, value) in &environment {
                println!("ENV {key}=\"{value}\"");
            }
            println!("RUN {instructions}");
        } else {
            println!("{} env vars, instructions {} bytes", environment.len(), instructions.len());
        }
    }
    Ok(())
}
