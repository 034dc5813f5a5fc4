//! SELinux labelling through the semanage transaction retry loop.

use pkideploy::process::tools::Selinux;
use pkideploy::{DeployError, Deployer, ProcessOutput, Subsystem};
use pkideploy_test_utils::{DeployRoot, RecordingRunner};
use std::sync::Arc;
use std::time::Duration;

const BUSY: &str = "ValueError: Could not start semanage transaction";

// ============================================================================
// RETRY LOOP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn import_retries_while_transaction_is_busy() {
    let runner = RecordingRunner::new();
    runner.respond_times("semanage", ProcessOutput::failed(1, BUSY), 3);

    let started = tokio::time::Instant::now();
    Selinux::new(&runner)
        .import_with_retry("fcontext -a -t x '/srv(/.*)?'\n")
        .await
        .unwrap();

    assert_eq!(runner.calls_to("semanage").len(), 4);
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn import_gives_up_after_ten_attempts() {
    let runner = RecordingRunner::new();
    runner.respond_times("semanage", ProcessOutput::failed(1, BUSY), 10);

    let err = Selinux::new(&runner)
        .import_with_retry("port -a -t http_port_t -p tcp 18443\n")
        .await
        .unwrap_err();

    match err {
        DeployError::RetryExhausted { attempts, message } => {
            assert_eq!(attempts, 10);
            assert!(message.contains("semanage transaction"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.calls_to("semanage").len(), 10);
}

#[tokio::test]
async fn import_fails_fast_on_other_errors() {
    let runner = RecordingRunner::new();
    runner.respond("semanage", ProcessOutput::failed(1, "Port tcp/18443 already defined"));

    let err = Selinux::new(&runner)
        .import_with_retry("port -a -t http_port_t -p tcp 18443\n")
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Subprocess { .. }), "{err}");
    assert_eq!(runner.calls_to("semanage").len(), 1);
}

// ============================================================================
// STAGE
// ============================================================================

#[tokio::test]
async fn spawn_labels_instance_when_selinux_is_enabled() {
    let root = DeployRoot::with_defaults("[Tomcat]\npki_https_port = 18443\n");
    let runner = Arc::new(RecordingRunner::new());
    runner.respond("selinuxenabled", ProcessOutput::ok(""));
    let deployer = Deployer::new(runner.clone());
    let user = root.user_config("ca.cfg", "[CA]\npki_skip_configuration = True\n");

    deployer
        .spawn(root.spawn_request(Subsystem::Ca, Some(user)))
        .await
        .unwrap();

    let imports = runner.calls_to("semanage");
    assert_eq!(imports.len(), 1);
    let script = imports[0].stdin.clone().unwrap_or_default();
    let layout = root.layout(Subsystem::Ca);
    assert!(script.contains(&format!(
        "fcontext -a -t pki_tomcat_var_lib_t '{}(/.*)?'",
        layout.instance_path().display()
    )));
    assert!(script.contains("port -a -t http_port_t -p tcp 18443"));
    assert!(!script.contains("tcp 8080"));

    let restorecon = runner.calls_to("restorecon");
    assert_eq!(restorecon.len(), 1);
    assert!(
        restorecon[0]
            .args
            .contains(&layout.instance_path().display().to_string())
    );
}

#[tokio::test]
async fn spawn_skips_labels_when_selinux_is_disabled() {
    let root = DeployRoot::new();
    let runner = Arc::new(RecordingRunner::new());
    let deployer = Deployer::new(runner.clone());
    let user = root.user_config("ca.cfg", "[CA]\npki_skip_configuration = True\n");

    deployer
        .spawn(root.spawn_request(Subsystem::Ca, Some(user)))
        .await
        .unwrap();

    assert_eq!(runner.calls_to("selinuxenabled").len(), 1);
    assert!(runner.calls_to("semanage").is_empty());
    assert!(runner.calls_to("restorecon").is_empty());
}
