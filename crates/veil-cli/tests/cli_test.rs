use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

const MAIN_JS: &str = "function main() {\n  // entry\n  return 'ready';\n}\nmain();\n";

fn project(config: &str, files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("veil.yaml"), config).unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }
    dir
}

fn config_arg(dir: &TempDir) -> String {
    dir.path().join("veil.yaml").to_str().unwrap().to_string()
}

#[test]
fn test_init_then_protect() {
    let dir = tempfile::tempdir().unwrap();

    cargo_bin_cmd!("veil")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .success();
    assert!(dir.path().join("veil.yaml").exists());

    // A second init must not overwrite
    cargo_bin_cmd!("veil")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already contains"));

    std::fs::create_dir_all(dir.path().join("dist")).unwrap();
    std::fs::write(dir.path().join("dist/main.js"), MAIN_JS).unwrap();

    cargo_bin_cmd!("veil")
        .args(["--config", dir.path().to_str().unwrap(), "protect"])
        .assert()
        .success()
        .stderr(predicate::str::contains("1 succeeded"));

    let protected = std::fs::read_to_string(dir.path().join("dist/main.js")).unwrap();
    assert_ne!(protected, MAIN_JS);
    assert!(!protected.contains("// entry"));
}

#[test]
fn test_no_subcommand_runs_protect() {
    let dir = project(
        "targets: [app.js]\nprofile: development\n",
        &[("app.js", "var  a = 1;\n")],
    );

    cargo_bin_cmd!("veil")
        .args(["--config", &config_arg(&dir)])
        .assert()
        .success();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("app.js")).unwrap(),
        "var a=1;"
    );
}

#[test]
fn test_missing_config_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    cargo_bin_cmd!("veil")
        .args(["--config", dir.path().join("nope.yaml").to_str().unwrap(), "protect"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[rstest]
#[case("targets: [a.js]\nprofile: turbo\n", "turbo")]
#[case("targets: [a.js]\nstringPoolThreshold: 2\n", "stringPoolThreshold")]
#[case("targets: [a.js, 7]\n", "target")]
fn test_invalid_config_rejected_before_any_file(#[case] config: &str, #[case] mentions: &str) {
    let dir = project(config, &[("a.js", "var a = 1;")]);
    cargo_bin_cmd!("veil")
        .args(["--config", &config_arg(&dir), "protect"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(mentions));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a.js")).unwrap(),
        "var a = 1;"
    );
}

#[test]
fn test_failed_file_exit_status() {
    let dir = project(
        "targets: [good.js, bad.js]\nprofile: development\n",
        &[("good.js", "ok();"), ("bad.js", "broken(;")],
    );

    // Per-file failures alone do not fail the run
    cargo_bin_cmd!("veil")
        .args(["--config", &config_arg(&dir), "protect"])
        .assert()
        .success()
        .stderr(predicate::str::contains("failed bad.js"));

    cargo_bin_cmd!("veil")
        .args(["--config", &config_arg(&dir), "protect", "--fail-on-error"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_target_reported_but_not_fatal() {
    let dir = project("targets: [dist/absent.js]\n", &[]);
    cargo_bin_cmd!("veil")
        .args(["--config", &config_arg(&dir), "protect", "--fail-on-error"])
        .assert()
        .success()
        .stderr(predicate::str::contains("skipped dist/absent.js"));
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_profile_from_environment() {
    let dir = project("targets: [app.js]\n", &[("app.js", "var  a = 1;\n")]);
    cargo_bin_cmd!("veil")
        .args(["--config", &config_arg(&dir), "protect"])
        .env("VEIL_PROFILE", "development")
        .assert()
        .success();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("app.js")).unwrap(),
        "var a=1;"
    );
}

#[test]
fn test_validate() {
    let dir = project(
        "targets: [app.js, missing.js]\nprofile: conservative\n",
        &[("app.js", "x();")],
    );
    cargo_bin_cmd!("veil")
        .args(["--config", &config_arg(&dir), "validate"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Configuration is valid"))
        .stderr(predicate::str::contains("missing.js"));

    // validate never writes
    assert_eq!(
        std::fs::read_to_string(dir.path().join("app.js")).unwrap(),
        "x();"
    );
}

#[test]
fn test_presets_listing() {
    cargo_bin_cmd!("veil")
        .arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("conservative"))
        .stdout(predicate::str::contains("extreme"))
        .stdout(predicate::str::contains("development"));

    cargo_bin_cmd!("veil")
        .args(["presets", "extreme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stringPoolThreshold: 1.0"));

    cargo_bin_cmd!("veil")
        .args(["presets", "turbo"])
        .assert()
        .failure();
}
