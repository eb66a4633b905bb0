//! Lowers the IR to a Dockerfile (§4.7). Deterministic: ENV keys are
//! sorted, RUN/ENTRYPOINT use JSON exec form, and a sanity check rejects
//! a rendered file containing `" + ` — the signature of an un-rendered
//! string concatenation leaking from a legacy template.

use super::builder::{IrBuilder, IrDirective};
use crate::error::{RecipeError, Result};

pub fn lower(builder: &IrBuilder) -> Result<String> {
    let mut out = String::new();
    for directive in builder.directives() {
        lower_one(directive, &mut out)?;
    }
    if out.contains("\" + ") {
        return Err(RecipeError::lowering(
            "rendered Dockerfile contains an un-rendered string concatenation (`\" + `)",
        ));
    }
    Ok(out)
}

fn lower_one(directive: &IrDirective, out: &mut String) -> Result<()> {
    match directive {
        IrDirective::From(image) => {
            if image.trim().is_empty() {
                return Err(RecipeError::lowering("FROM requires a non-empty image"));
            }
            out.push_str("FROM ");
            out.push_str(image);
            out.push('\n');
        }
        IrDirective::Env(map) => {
            if map.is_empty() {
                return Ok(());
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push_str("ENV ");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(" \\\n    ");
                }
                out.push_str(key);
                out.push('=');
                out.push_str(&quote_env_value(&map[*key]));
            }
            out.push('\n');
        }
        IrDirective::Run(cmd) => {
            out.push_str("RUN ");
            out.push_str(&exec_form(&["/bin/bash", "-lc", cmd]));
            out.push('\n');
        }
        IrDirective::RunWithMounts { mounts, command } => {
            out.push_str("RUN");
            for mount in mounts {
                out.push_str(" --mount=");
                out.push_str(mount);
            }
            out.push(' ');
            out.push_str(&exec_form(&["/bin/bash", "-lc", command]));
            out.push('\n');
        }
        IrDirective::Copy { sources, dest } => {
            if dest.trim().is_empty() {
                return Err(RecipeError::lowering("COPY requires a non-empty destination"));
            }
            out.push_str("COPY ");
            for src in sources {
                out.push_str(&quote_path(src));
                out.push(' ');
            }
            out.push_str(&quote_path(dest));
            out.push('\n');
        }
        IrDirective::LiteralFile { path, contents, executable } => {
            let mode = if *executable { "0755" } else { "0644" };
            let dir = parent_dir(path);
            let delim = "NEUROFORGE_EOF";
            let cmd = format!(
                "mkdir -p {dir} && cat > {path} <<'{delim}'\n{contents}\n{delim}\nchmod {mode} {path}"
            );
            out.push_str("RUN ");
            out.push_str(&exec_form(&["/bin/bash", "-lc", &cmd]));
            out.push('\n');
        }
        IrDirective::Workdir(path) => {
            if path.trim().is_empty() {
                return Err(RecipeError::lowering("WORKDIR requires a non-empty path"));
            }
            out.push_str("WORKDIR ");
            out.push_str(path);
            out.push('\n');
        }
        IrDirective::User(user) => {
            if user.trim().is_empty() {
                return Err(RecipeError::lowering("USER requires a non-empty value"));
            }
            out.push_str("USER ");
            out.push_str(user);
            out.push('\n');
        }
        IrDirective::Entrypoint(cmd) => {
            if cmd.trim().is_empty() {
                return Err(RecipeError::lowering("ENTRYPOINT requires a non-empty command"));
            }
            out.push_str("ENTRYPOINT ");
            out.push_str(&exec_form(&["/bin/bash", "-lc", cmd]));
            out.push('\n');
        }
        IrDirective::ExecEntrypoint(argv) => {
            if argv.is_empty() {
                return Err(RecipeError::lowering("ENTRYPOINT requires a non-empty argv"));
            }
            out.push_str("ENTRYPOINT ");
            let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
            out.push_str(&exec_form(&refs));
            out.push('\n');
        }
    }
    Ok(())
}

fn exec_form(argv: &[&str]) -> String {
    let json = serde_json::to_string(argv).expect("string array always serializes");
    json.trim_end_matches('\n').to_string()
}

fn quote_env_value(v: &str) -> String {
    format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
}

fn quote_path(p: &str) -> String {
    format!("\"{}\"", p.escape_default())
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => path[..i].to_string(),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn from_requires_non_empty_image() {
        let b = IrBuilder::new().add(IrDirective::From(String::new()));
        assert!(lower(&b).is_err());
    }

    #[test]
    fn env_keys_are_sorted_and_order_independent() {
        let mut m1 = IndexMap::new();
        m1.insert("B".to_string(), "2".to_string());
        m1.insert("A".to_string(), "1".to_string());
        let mut m2 = IndexMap::new();
        m2.insert("A".to_string(), "1".to_string());
        m2.insert("B".to_string(), "2".to_string());

        let out1 = lower(&IrBuilder::new().add(IrDirective::Env(m1))).unwrap();
        let out2 = lower(&IrBuilder::new().add(IrDirective::Env(m2))).unwrap();
        assert_eq!(out1, out2);
        assert!(out1.starts_with("ENV A=\"1\""));
    }

    #[test]
    fn run_is_exec_form_json() {
        let b = IrBuilder::new().add(IrDirective::Run("echo hi".to_string()));
        let out = lower(&b).unwrap();
        assert_eq!(out, "RUN [\"/bin/bash\",\"-lc\",\"echo hi\"]\n");
    }

    #[test]
    fn run_with_mounts_prepends_mount_flags() {
        let b = IrBuilder::new().add(IrDirective::RunWithMounts {
            mounts: vec!["type=bind,from=cache,source=/,target=/.neurocontainer-cache,readonly".to_string()],
            command: "sha256sum /.neurocontainer-cache/installer.bin".to_string(),
        });
        let out = lower(&b).unwrap();
        assert!(out.starts_with("RUN --mount=type=bind,from=cache,source=/,target=/.neurocontainer-cache,readonly ["));
    }

    #[test]
    fn detects_unrendered_concatenation() {
        let b = IrBuilder::new().add(IrDirective::Run("echo \" + x".to_string()));
        assert!(lower(&b).is_err());
    }

    #[test]
    fn literal_file_sets_executable_mode() {
        let b = IrBuilder::new().add(IrDirective::LiteralFile {
            path: "/usr/bin/ll".to_string(),
            contents: "ls -la".to_string(),
            executable: true,
        });
        let out = lower(&b).unwrap();
        assert!(out.contains("chmod 0755 /usr/bin/ll"));
    }
}
