//! Process lifecycle tests
//!
//! Readiness is TCP-level only, so a listener owned by the test stands in for
//! the submission's socket while `sh`/`sleep` play the supervised process.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use webgrade_scenario::{
    allocate_port, EntryPoint, ProcessState, ProcessSupervisor, ScenarioError, SupervisorConfig,
};

mod common;
#[cfg(target_os = "linux")]
use common::{live_members, wait_for_group_exit};

fn shell(script: &str) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(EntryPoint {
        program: "sh".to_string(),
        bundle: None,
        args: vec!["-c".to_string(), script.to_string()],
    });
    config.grace_period_ms = 200;
    config
}

#[tokio::test]
async fn startup_timeout_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let port = allocate_port().unwrap();
    let mut config = shell("echo starting; echo warming up >&2; exec sleep 30");
    config.startup_timeout_ms = 1000;
    config.poll_interval_ms = 100;

    let start = Instant::now();
    let result = ProcessSupervisor::new(config).start(dir.path(), port).await;
    let elapsed = start.elapsed();

    match result {
        Err(ScenarioError::StartupTimeout {
            port: p,
            stdout,
            stderr,
            ..
        }) => {
            assert_eq!(p, port);
            assert!(stdout.contains("starting"), "stdout: {stdout}");
            assert!(stderr.contains("warming up"), "stderr: {stderr}");
        }
        Err(e) => panic!("expected startup timeout, got {e}"),
        Ok(_) => panic!("expected startup timeout, server became ready"),
    }

    // deadline + one poll interval, plus kill/reap overhead
    assert!(
        elapsed < Duration::from_millis(1000 + 100 + 400),
        "startup took {elapsed:?}"
    );
    assert!(elapsed >= Duration::from_millis(1000));
}

#[tokio::test]
async fn early_exit_is_reported_with_output() {
    let dir = tempfile::tempdir().unwrap();
    let port = allocate_port().unwrap();
    let mut config = shell("echo 'Traceback: boom' >&2; exit 3");
    config.startup_timeout_ms = 5000;

    let start = Instant::now();
    let result = ProcessSupervisor::new(config).start(dir.path(), port).await;

    match result {
        Err(ScenarioError::ProcessExited { stderr, .. }) => {
            assert!(stderr.contains("Traceback: boom"), "stderr: {stderr}");
        }
        Err(e) => panic!("expected early exit, got {e}"),
        Ok(_) => panic!("expected early exit"),
    }
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn spawn_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = SupervisorConfig::new(EntryPoint {
        program: "/nonexistent/interpreter".to_string(),
        bundle: None,
        args: vec![],
    });

    let result = ProcessSupervisor::new(config).start(dir.path(), 1).await;
    assert!(matches!(result, Err(ScenarioError::Spawn { .. })));
}

#[tokio::test]
async fn ready_process_accepts_connections() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut target = ProcessSupervisor::new(shell("exec sleep 30"))
        .start(dir.path(), port)
        .await
        .unwrap();

    assert_eq!(target.state(), ProcessState::Ready);
    assert_eq!(target.port(), port);
    assert_eq!(target.base_url(), format!("http://127.0.0.1:{port}"));
    tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("ready port must accept a connection");

    target.stop().await;
    assert_eq!(target.state(), ProcessState::Stopped);
}

#[tokio::test]
async fn spawned_target_starts_before_it_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = shell("exec sleep 30");

    let mut target = ProcessSupervisor::new(config.clone())
        .spawn(dir.path(), port)
        .unwrap();
    assert_eq!(target.state(), ProcessState::Starting);
    assert!(!target.process_group().is_stopped());

    target.wait_until_ready(&config).await.unwrap();
    assert_eq!(target.state(), ProcessState::Ready);

    target.stop().await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn stop_kills_the_whole_group_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // A grandchild that ignores SIGTERM forces the SIGKILL phase.
    let config = shell("sh -c 'trap \"\" TERM; sleep 30' & sleep 30 & wait");
    let mut target = ProcessSupervisor::new(config)
        .start(dir.path(), port)
        .await
        .unwrap();
    let group = target.process_group();

    // Give the shell a moment to fork its children.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(live_members(group.pgid()).len() >= 3);

    target.stop().await;
    target.stop().await;
    group.terminate(Duration::from_millis(10));

    assert!(wait_for_group_exit(group.pgid()).await.is_empty());
    assert!(group.is_stopped());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn dropping_a_ready_target_kills_its_group() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let target = ProcessSupervisor::new(shell("sleep 30 & wait"))
        .start(dir.path(), port)
        .await
        .unwrap();
    let group = target.process_group();
    drop(target);

    assert!(wait_for_group_exit(group.pgid()).await.is_empty());
}

#[tokio::test]
async fn bundled_interpreter_is_preferred() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join(".venv/bin");
    std::fs::create_dir_all(&bin).unwrap();
    write_executable(&bin.join("python3"), "#!/bin/sh\necho bundled >&2\nexit 7\n");

    let config = SupervisorConfig::new(EntryPoint {
        program: "/nonexistent/python3".to_string(),
        bundle: Some(".venv/bin/python3".into()),
        args: vec![],
    });
    let port = allocate_port().unwrap();

    match ProcessSupervisor::new(config).start(dir.path(), port).await {
        Err(ScenarioError::ProcessExited { stderr, .. }) => assert!(stderr.contains("bundled")),
        Err(e) => panic!("expected the bundled interpreter to run, got {e}"),
        Ok(_) => panic!("bundled script should have exited"),
    }
}

#[tokio::test]
async fn environment_carries_port_and_test_mode() {
    let dir = tempfile::tempdir().unwrap();
    let port = allocate_port().unwrap();
    let mut config = shell("echo \"port=$FLASK_RUN_PORT mode=$BOOTCS_TEST_MODE app=$FLASK_APP arg=$1\" >&2; exit 1");
    config.entry.args.push("argv0".to_string());
    config.entry.args.push("{port}".to_string());
    config.env.insert("FLASK_APP".to_string(), "app.py".to_string());

    match ProcessSupervisor::new(config).start(dir.path(), port).await {
        Err(ScenarioError::ProcessExited { stderr, .. }) => {
            assert!(
                stderr.contains(&format!("port={port} mode=1 app=app.py arg={port}")),
                "stderr: {stderr}"
            );
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("script should have exited"),
    }
}

fn write_executable(path: &Path, content: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
