//! Recipe schema (§3 DATA MODEL). `BuildFile`/`BuildRecipe`/`Directive`
//! are deserialized straight off recipe YAML with strict (deny-unknown)
//! decoding — unknown fields are a `SchemaError`, not silently dropped.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{RecipeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "aarch64")]
    Aarch64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Yum,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt",
            PackageManager::Yum => "yum",
        }
    }
}

/// A raw recipe string or list-of-strings field (e.g. `install`,
/// `copy`), accepted in either shape per §4.1.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub executable: bool,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub retry: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployEntry {
    #[serde(default)]
    pub bins: Vec<String>,
    #[serde(default)]
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TestEntry {
    Builtin(String),
    Script { executable: String, script: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateRef {
    pub name: String,
    #[serde(default)]
    pub binaries: IndexMap<String, serde_yml::Value>,
}

/// One directive. The action fields are mutually exclusive (§3
/// invariant: "A directive must declare exactly one action kind"); the
/// loader (`recipe.rs`) validates exclusivity after deserialization
/// since serde's `deny_unknown_fields` can't express that itself.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Directive {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub with: IndexMap<String, serde_yml::Value>,

    #[serde(default)]
    pub run: Option<OneOrMany>,
    #[serde(default)]
    pub install: Option<OneOrMany>,
    #[serde(default)]
    pub environment: Option<IndexMap<String, String>>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub file: Option<FileEntry>,
    #[serde(default)]
    pub deploy: Option<DeployEntry>,
    #[serde(default)]
    pub test: Option<TestEntry>,
    #[serde(default)]
    pub template: Option<TemplateRef>,
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub copy: Option<OneOrMany>,
    #[serde(default)]
    pub variables: Option<IndexMap<String, serde_yml::Value>>,
    #[serde(default)]
    pub boutique: Option<serde_yml::Value>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub script_file: Option<String>,
    #[serde(default)]
    pub group: Option<Vec<Directive>>,

    // §9 open question #4: parsed but rejected at validation time.
    #[serde(default)]
    pub custom: Option<serde_yml::Value>,
    #[serde(default, rename = "customParams")]
    pub custom_params: Option<serde_yml::Value>,
}

/// The distinct action kind a directive carries, after validating
/// exclusivity.
#[derive(Debug, Clone)]
pub enum Action {
    Run(Vec<String>),
    Install(Vec<String>),
    Environment(IndexMap<String, String>),
    User(String),
    Workdir(String),
    Entrypoint(String),
    File(FileEntry),
    Deploy(DeployEntry),
    Test(TestEntry),
    Template(TemplateRef),
    Include(String),
    Copy(Vec<String>),
    Variables(IndexMap<String, serde_yml::Value>),
    Boutique(serde_yml::Value),
    Script { inline: Option<String>, file: Option<String> },
    Group(Vec<Directive>),
}

impl Directive {
    /// Validates the exclusive-action-kind invariant and the rejected
    /// `custom`/`customParams` fields, returning the resolved action.
    pub fn action(&self) -> Result<Action> {
        if self.custom.is_some() || self.custom_params.is_some() {
            return Err(RecipeError::schema(
                "directive.custom",
                "`custom`/`customParams` are parsed but have no defined semantics; remove them",
            ));
        }

        let mut present = Vec::new();
        macro_rules! mark {
            ($field:expr, $label:literal) => {
                if $field.is_some() {
                    present.push($label);
                }
            };
        }
        mark!(self.run, "run");
        mark!(self.install, "install");
        mark!(self.environment, "environment");
        mark!(self.user, "user");
        mark!(self.workdir, "workdir");
        mark!(self.entrypoint, "entrypoint");
        mark!(self.file, "file");
        mark!(self.deploy, "deploy");
        mark!(self.test, "test");
        mark!(self.template, "template");
        mark!(self.include, "include");
        mark!(self.copy, "copy");
        mark!(self.variables, "variables");
        mark!(self.boutique, "boutique");
        mark!(self.group, "group");
        if self.script.is_some() || self.script_file.is_some() {
            present.push("script");
        }

        if present.len() > 1 {
            return Err(RecipeError::schema(
                "directive",
                format!("directive declares more than one action kind: {present:?}"),
            ));
        }
        let Some(kind) = present.first() else {
            return Err(RecipeError::schema("directive", "directive declares no action kind"));
        };

        Ok(match *kind {
            "run" => Action::Run(self.run.clone().unwrap().into_vec()),
            "install" => Action::Install(self.install.clone().unwrap().into_vec()),
            "environment" => Action::Environment(self.environment.clone().unwrap()),
            "user" => Action::User(self.user.clone().unwrap()),
            "workdir" => Action::Workdir(self.workdir.clone().unwrap()),
            "entrypoint" => Action::Entrypoint(self.entrypoint.clone().unwrap()),
            "file" => Action::File(self.file.clone().unwrap()),
            "deploy" => Action::Deploy(self.deploy.clone().unwrap()),
            "test" => Action::Test(self.test.clone().unwrap()),
            "template" => Action::Template(self.template.clone().unwrap()),
            "include" => Action::Include(self.include.clone().unwrap()),
            "copy" => Action::Copy(self.copy.clone().unwrap().into_vec()),
            "variables" => Action::Variables(self.variables.clone().unwrap()),
            "boutique" => Action::Boutique(self.boutique.clone().unwrap()),
            "group" => Action::Group(self.group.clone().unwrap()),
            "script" => Action::Script {
                inline: self.script.clone(),
                file: self.script_file.clone(),
            },
            other => unreachable!("unhandled action kind {other:?}"),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BuildRecipe {
    pub kind: String,
    #[serde(rename = "base-image")]
    pub base_image: String,
    #[serde(rename = "pkg-manager")]
    pub pkg_manager: PackageManager,
    #[serde(default)]
    pub directives: Vec<Directive>,
    #[serde(default = "default_true", rename = "add-default-template")]
    pub add_default_template: bool,
    #[serde(default = "default_true", rename = "add-tzdata")]
    pub add_tzdata: bool,
    #[serde(default, rename = "fix-locale-def")]
    pub fix_locale_def: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildFile {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub epoch: Option<u32>,
    pub architectures: Vec<Arch>,
    #[serde(default)]
    pub options: IndexMap<String, serde_yml::Value>,
    #[serde(default)]
    pub variables: IndexMap<String, serde_yml::Value>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub deploy: Option<DeployEntry>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub copyright: Vec<String>,
    pub build: BuildRecipe,
}

impl BuildFile {
    pub fn from_yaml(src: &str) -> Result<Self> {
        serde_yml::from_str(src).map_err(RecipeError::from)
    }

    pub fn validate(&self) -> Result<()> {
        if self.architectures.is_empty() {
            return Err(RecipeError::schema("architectures", "at least one architecture is required"));
        }
        if self.build.base_image.trim().is_empty() {
            return Err(RecipeError::schema("build.base-image", "must not be empty"));
        }
        for directive in &self.build.directives {
            directive.action()?;
        }
        Ok(())
    }
}

/// `{builder, directives}` — the shape of a file resolved by the
/// `include` directive (§6 External Interfaces).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeFile {
    #[serde(default)]
    pub builder: Option<String>,
    #[serde(default)]
    pub directives: Vec<Directive>,
}

impl IncludeFile {
    pub fn from_yaml(src: &str) -> Result<Self> {
        serde_yml::from_str(src).map_err(RecipeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_recipe_parses() {
        let yaml = r#"
name: foo
version: "1.0"
architectures: [x86_64]
readme: "x"
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  directives: []
"#;
        let bf = BuildFile::from_yaml(yaml).unwrap();
        bf.validate().unwrap();
        assert_eq!(bf.name, "foo");
        assert_eq!(bf.build.pkg_manager.as_str(), "apt");
    }

    #[test]
    fn directive_with_two_actions_is_rejected() {
        let yaml = r#"
name: foo
version: "1.0"
architectures: [x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  directives:
    - run: ["echo hi"]
      workdir: "/tmp"
"#;
        let bf = BuildFile::from_yaml(yaml).unwrap();
        assert!(bf.validate().is_err());
    }

    #[test]
    fn custom_field_is_rejected() {
        let yaml = r#"
name: foo
version: "1.0"
architectures: [x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  directives:
    - run: ["echo hi"]
      custom: "whatever"
"#;
        let bf = BuildFile::from_yaml(yaml).unwrap();
        assert!(bf.validate().is_err());
    }

    #[test]
    fn unknown_top_level_field_is_a_schema_error() {
        let yaml = r#"
name: foo
version: "1.0"
architectures: [x86_64]
unknown_field: true
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  directives: []
"#;
        assert!(BuildFile::from_yaml(yaml).is_err());
    }
}
