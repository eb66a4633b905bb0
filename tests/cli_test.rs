//! CLI integration tests
//!
//! Tests the neuroforge CLI commands end-to-end against the compiled
//! binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn neuroforge() -> Command {
    Command::cargo_bin("neuroforge").unwrap()
}

#[test]
fn test_version_flag() {
    neuroforge()
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::contains("neuroforge"));
}

#[test]
fn test_help_flag() {
    neuroforge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Declarative container recipe compiler"));
}

#[test]
fn test_generate_help() {
    neuroforge()
        .args(["generate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("recipe"));
}

#[test]
fn test_build_help_lists_local_flag() {
    neuroforge()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--local"));
}

#[test]
fn test_generate_missing_recipe_fails() {
    neuroforge()
        .args(["generate", "/nonexistent/build.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_generate_minimal_recipe() {
    let dir = tempfile::tempdir().unwrap();
    let recipe_path = dir.path().join("build.yaml");
    std::fs::write(
        &recipe_path,
        r#"
name: smoke
version: "1.0"
architectures: [x86_64]
readme: "x"
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  add-default-template: false
  add-tzdata: false
  directives:
    - run: ["echo hello"]
"#,
    )
    .unwrap();

    neuroforge()
        .args(["generate", recipe_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("FROM debian:bookworm"))
        .stdout(predicate::str::contains("echo hello"));
}

#[test]
fn test_generate_rejects_two_action_directive() {
    let dir = tempfile::tempdir().unwrap();
    let recipe_path = dir.path().join("build.yaml");
    std::fs::write(
        &recipe_path,
        r#"
name: smoke
version: "1.0"
architectures: [x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  directives:
    - run: ["echo hi"]
      workdir: "/tmp"
"#,
    )
    .unwrap();

    neuroforge()
        .args(["generate", recipe_path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_generate_schema_error_renders_miette_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let recipe_path = dir.path().join("build.yaml");
    std::fs::write(
        &recipe_path,
        r#"
name: smoke
version: "1.0"
architectures: [x86_64]
build:
  kind: neurodocker
  base-image: "debian:bookworm"
  pkg-manager: apt
  directives:
    - run: ["echo hi"]
      workdir: "/tmp"
"#,
    )
    .unwrap();

    neuroforge()
        .args(["generate", recipe_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("neuroforge::schema"));
}

#[test]
fn test_test_all_with_no_recipe_roots_configured() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("builder.config.yaml");
    std::fs::write(&config_path, "recipe_roots: []\n").unwrap();

    neuroforge()
        .args(["--config", config_path.to_str().unwrap(), "test-all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no recipe_roots configured"));
}

#[test]
fn test_template_tests_print_dockerfile() {
    neuroforge()
        .args(["template-tests", "_header", "--print-dockerfile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("== _header =="))
        .stdout(predicate::str::contains("RUN"));
}

#[test]
fn test_template_tests_unknown_pack_fails() {
    neuroforge()
        .args(["template-tests", "does-not-exist"])
        .assert()
        .failure();
}
