use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fathost() -> Command {
    cargo_bin_cmd!("fathost")
}

/// Config rooting all state under `dir`
fn isolated_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    let content = format!(
        "[general]\naudit_log = false\n\n[host]\nstate_dir = \"{}\"\nwork_area = \"{}\"\n",
        dir.join("state").display(),
        dir.join("work").display()
    );
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn help_displays() {
    fathost()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("shared library cache"));
}

#[test]
fn version_displays() {
    fathost()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fathost"));
}

#[test]
fn config_path_follows_flag() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    fathost()
        .args(["config", "path", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    fathost()
        .args(["config", "show", "--config"])
        .arg(dir.path().join("missing.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("[host]"))
        .stdout(predicate::str::contains("readiness_timeout_secs = 300"));
}

#[test]
fn invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[host\n").unwrap();
    fathost()
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn cache_store_then_resolve() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(dir.path());
    let library = dir.path().join("app-core-1.0.jar");
    fs::write(&library, b"library bytes").unwrap();

    let output = fathost()
        .args(["cache", "store", "--entry", "BOOT-INF/lib/app-core-1.0.jar", "--config"])
        .arg(&config)
        .arg(&library)
        .output()
        .unwrap();
    assert!(output.status.success());
    let line = String::from_utf8(output.stdout).unwrap();
    assert!(line.starts_with("BOOT-INF/lib/app-core-1.0.jar="));

    let index = dir.path().join("lib.index");
    fs::write(&index, &line).unwrap();

    fathost()
        .args(["cache", "resolve", "--format", "plain", "--config"])
        .arg(&config)
        .arg(&index)
        .assert()
        .success()
        .stdout(predicate::str::contains("app-core-1.0.jar"))
        .stdout(predicate::str::contains("MISSING").not());
}

#[test]
fn cache_resolve_reports_missing_library() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(dir.path());
    let index = dir.path().join("lib.index");
    fs::write(&index, "BOOT-INF/lib/gone.jar=abcdef0123\n").unwrap();

    fathost()
        .args(["cache", "resolve", "--format", "plain", "--config"])
        .arg(&config)
        .arg(&index)
        .assert()
        .failure()
        .stdout(predicate::str::contains("MISSING BOOT-INF/lib/gone.jar"))
        .stderr(predicate::str::contains("not present in any library cache root"));
}

#[test]
fn cache_store_missing_file() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(dir.path());
    fathost()
        .args(["cache", "store", "--entry", "BOOT-INF/lib/x.jar", "--config"])
        .arg(&config)
        .arg(dir.path().join("x.jar"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Library file not found"));
}

#[test]
fn cache_locate_shards_by_hash() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(dir.path());
    fathost()
        .args(["cache", "locate", "BOOT-INF/lib/a.jar=abcdef", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ab/cdef/a.jar"));
}

#[test]
fn cache_locate_rejects_malformed_reference() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(dir.path());
    fathost()
        .args(["cache", "locate", "a=b=c", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed index line"));
}

#[test]
fn units_list_empty() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(dir.path());
    fathost()
        .args(["units", "list", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No configuration units found."));
}

#[test]
fn units_purge_empty() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(dir.path());
    fathost()
        .args(["units", "purge", "--config"])
        .arg(&config)
        .assert()
        .success();
}
