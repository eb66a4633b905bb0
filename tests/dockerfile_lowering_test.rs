//! End-to-end recipe-to-Dockerfile scenarios exercised through the
//! public `neuroforge::generate` entry point — scripts, template packs,
//! includes and groups combined, rather than one directive kind at a
//! time (covered already by the per-module unit tests).

use indexmap::IndexMap;
use neuroforge::model::BuildFile;
use neuroforge::template::{DirLoader, MapLoader};

fn generate(src: &str, include_dirs: Vec<std::path::PathBuf>, loader: &dyn neuroforge::template::Loader) -> neuroforge::GeneratedRecipe {
    let build_file = BuildFile::from_yaml(src).unwrap();
    neuroforge::generate(&build_file, include_dirs, IndexMap::new(), loader).unwrap()
}

#[test]
fn script_directive_installs_packages_and_sets_env() {
    let out = generate(
        r#"
name: foo
version: "1.0"
architectures: [x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  add-default-template: false
  add-tzdata: false
  directives:
    - script: |
        install_packages('curl', 'ca-certificates')
        set_environment('GREETING', 'hello')
"#,
        vec![],
        &MapLoader::new(),
    );
    assert!(out.dockerfile.contains("apt-get install -y curl ca-certificates"));
    assert!(out.dockerfile.contains("GREETING=\"hello\""));
}

#[test]
fn template_directive_resolves_miniconda_pack() {
    let out = generate(
        r#"
name: foo
version: "1.0"
architectures: [x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  add-default-template: false
  add-tzdata: false
  directives:
    - template:
        name: miniconda
        binaries:
          version: "23.1.0"
"#,
        vec![],
        &MapLoader::new(),
    );
    assert!(out.dockerfile.contains("miniconda-23.1.0"));
    assert!(out.dockerfile.contains("Miniconda3-23.1.0-Linux-x86_64.sh"));
}

#[test]
fn include_directive_pulls_in_directives_from_a_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("common.yaml"),
        r#"
directives:
  - run: ["echo from-include"]
"#,
    )
    .unwrap();

    let out = generate(
        r#"
name: foo
version: "1.0"
architectures: [x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  add-default-template: false
  add-tzdata: false
  directives:
    - include: "common.yaml"
"#,
        vec![dir.path().to_path_buf()],
        &DirLoader::new(vec![dir.path().to_path_buf()]),
    );
    assert!(out.dockerfile.contains("echo from-include"));
}

#[test]
fn group_with_condition_is_skipped_when_condition_is_false() {
    let out = generate(
        r#"
name: foo
version: "1.0"
architectures: [x86_64]
variables:
  enable_extra: false
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  add-default-template: false
  add-tzdata: false
  directives:
    - condition: "enable_extra"
      group:
        - run: ["echo should-not-appear"]
"#,
        vec![],
        &MapLoader::new(),
    );
    assert!(!out.dockerfile.contains("should-not-appear"));
}

#[test]
fn aarch64_architecture_is_selected_when_listed_first() {
    let out = generate(
        r#"
name: foo
version: "1.0"
architectures: [aarch64, x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  add-default-template: false
  add-tzdata: false
  directives:
    - run: ["echo {{ arch }}"]
"#,
        vec![],
        &MapLoader::new(),
    );
    assert!(out.dockerfile.contains("echo aarch64"));
}
