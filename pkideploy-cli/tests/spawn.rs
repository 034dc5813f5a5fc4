use predicates::prelude::*;

mod common;

#[test]
fn test_help_lists_subcommands() {
    let mut ctx = common::pkideploy();
    ctx.cmd
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("spawn"))
        .stdout(predicate::str::contains("destroy"));
}

#[test]
fn test_spawn_help_shows_options() {
    let mut ctx = common::pkideploy();
    ctx.cmd
        .args(["spawn", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--subsystem"))
        .stdout(predicate::str::contains("--file"))
        .stdout(predicate::str::contains("key=value"));
}

#[test]
fn test_spawn_rejects_unknown_subsystem() {
    let mut ctx = common::pkideploy();
    ctx.cmd
        .args(["spawn", "-s", "RA"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported subsystem 'RA'"));
    assert!(ctx.log_files().is_empty());
}

#[test]
fn test_spawn_rejects_malformed_override() {
    let mut ctx = common::pkideploy();
    ctx.cmd
        .args(["spawn", "-s", "CA", "-o", "pki_https_port"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

#[test]
fn test_spawn_missing_config_file() {
    let mut ctx = common::pkideploy();
    let missing = ctx.log_dir().join("nowhere.cfg");
    ctx.cmd
        .args(["spawn", "-s", "ca", "-f"])
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Installation failed for CA"));

    let logs = ctx.log_files();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("pki-ca-spawn."));
    assert!(logs[0].ends_with(".log"));
}

#[test]
fn test_spawn_conflicting_scenario_touches_nothing() {
    let mut ctx = common::pkideploy();
    let user = ctx.user_config(
        "ca.cfg",
        "[CA]\npki_clone = True\npki_external = True\npki_skip_configuration = True\n",
    );
    let before = ctx.root.snapshot();

    ctx.cmd
        .args(["spawn", "-s", "CA", "-f"])
        .arg(&user)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Installation failed"))
        .stderr(predicate::str::contains("clone and external"));

    assert_eq!(ctx.root.snapshot(), before);
}
