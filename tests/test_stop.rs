mod common;

use std::time::{Duration, Instant};

use gateway_supervisor::SupervisorBuilder;

use common::{fast_supervisor, gateway_script, process_gone, wait_for_status};

const STUBBORN: &str = "trap '' TERM\necho ready\nsleep 10";

#[tokio::test]
async fn test_graceful_stop_is_quick() {
    let gateway = gateway_script("sleep 30");
    let supervisor = fast_supervisor(&gateway.binary);
    assert!(supervisor.start().await.success);

    let begun = Instant::now();
    let result = supervisor.stop().await;
    assert!(result.success, "{}", result.message);
    assert!(begun.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_stop_escalates_to_kill() {
    let gateway = gateway_script(STUBBORN);
    let supervisor = fast_supervisor(&gateway.binary);
    assert!(supervisor.start().await.success);
    wait_for_status(&supervisor, Duration::from_secs(5), |s| {
        s.recent_logs.iter().any(|line| line == "ready")
    })
    .await;

    let begun = Instant::now();
    let result = supervisor.stop().await;
    let elapsed = begun.elapsed();

    assert!(result.success, "{}", result.message);
    assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(2500), "{elapsed:?}");
    assert!(!supervisor.status().await.running);
}

#[tokio::test]
async fn test_stop_escalation_with_default_timings() {
    let gateway = gateway_script(STUBBORN);
    let supervisor = SupervisorBuilder::new(&gateway.binary)
        .with_env_files(Vec::<std::path::PathBuf>::new())
        .build()
        .into_handle();
    assert!(supervisor.start().await.success);
    wait_for_status(&supervisor, Duration::from_secs(5), |s| {
        s.recent_logs.iter().any(|line| line == "ready")
    })
    .await;

    let begun = Instant::now();
    let result = supervisor.stop().await;
    let elapsed = begun.elapsed();

    assert!(result.success, "{}", result.message);
    assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(9), "{elapsed:?}");
    assert!(!supervisor.status().await.running);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stop_reaches_whole_process_group() {
    let gateway = gateway_script("sleep 30 &\necho \"child $!\"\nwait");
    let supervisor = fast_supervisor(&gateway.binary);
    assert!(supervisor.start().await.success);

    let status = wait_for_status(&supervisor, Duration::from_secs(5), |s| {
        s.recent_logs.iter().any(|line| line.starts_with("child "))
    })
    .await;
    let grandchild: i32 = status
        .recent_logs
        .iter()
        .find_map(|line| line.strip_prefix("child "))
        .and_then(|pid| pid.parse().ok())
        .expect("grandchild pid logged");
    assert!(!process_gone(grandchild));

    assert!(supervisor.stop().await.success);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !process_gone(grandchild) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(process_gone(grandchild));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stop_kills_descendants_that_ignore_term() {
    let gateway = gateway_script(
        "(trap '' TERM; while true; do echo tick; sleep 0.05; done) &\necho \"child $!\"\nsleep 30",
    );
    let supervisor = fast_supervisor(&gateway.binary);
    assert!(supervisor.start().await.success);

    let status = wait_for_status(&supervisor, Duration::from_secs(5), |s| {
        s.recent_logs.iter().any(|line| line.starts_with("child "))
    })
    .await;
    let stubborn: i32 = status
        .recent_logs
        .iter()
        .find_map(|line| line.strip_prefix("child "))
        .and_then(|pid| pid.parse().ok())
        .expect("descendant pid logged");

    let result = supervisor.stop().await;
    assert!(result.success, "{}", result.message);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !process_gone(stubborn) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(process_gone(stubborn));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let logged = supervisor.status().await.recent_logs;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(supervisor.status().await.recent_logs, logged);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_restart_replaces_stubborn_gateway() {
    let gateway = gateway_script(STUBBORN);
    let supervisor = fast_supervisor(&gateway.binary);
    let first = supervisor.start().await;
    wait_for_status(&supervisor, Duration::from_secs(5), |s| {
        s.recent_logs.iter().any(|line| line == "ready")
    })
    .await;

    let restarted = supervisor.restart().await;
    assert!(restarted.success, "{}", restarted.message);
    assert_ne!(restarted.pid, first.pid);
    assert!(process_gone(first.pid.unwrap() as i32));

    assert!(supervisor.stop().await.success);
}
