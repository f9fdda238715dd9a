//! CLI integration tests for the demo and run modes.

use std::process::Command;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_task_pipeline")
}

#[test]
fn demo_cli_prints_summary_for_every_task() {
    // Run the demo binary with default settings.
    let output = Command::new(bin())
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run demo binary");

    assert!(
        output.status.success(),
        "demo exited with non-zero status: {:?}",
        output.status
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("DEMO SUMMARY"),
        "demo summary missing from output"
    );

    // Every task is listed, whether it produced a value or was missed.
    let results_line = stdout
        .lines()
        .find(|line| line.starts_with("results="))
        .expect("results line missing");
    assert_eq!(results_line.matches(',').count(), 9);

    let failures_line = stdout
        .lines()
        .find(|line| line.starts_with("failures="))
        .expect("failures line missing");
    assert_eq!(failures_line.trim(), "failures=0");
}

#[test]
fn sequential_inline_run_has_no_shortfall() {
    let output = Command::new(bin())
        .args(["run", "5", "1", "inline", "sequential", "seed=3"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run binary");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let header = stdout.lines().next().expect("report header missing");
    assert!(header.contains("dispatched=5"), "header: {header}");
    assert!(header.contains("shortfall=0"), "header: {header}");
    assert_eq!(stdout.lines().filter(|l| l.starts_with("slot[")).count(), 5);
}

#[test]
fn fail_flag_marks_one_slot() {
    let output = Command::new(bin())
        .args(["run", "4", "1", "async", "sequential", "fail"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run binary");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let failed: Vec<&str> = stdout
        .lines()
        .filter(|line| line.contains("error("))
        .collect();
    assert_eq!(failed, vec!["slot[2]=error(task panicked: task 2 failed)"]);
}

#[test]
fn negative_task_count_is_rejected() {
    let output = Command::new(bin())
        .args(["run", "-3"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run binary");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must not be negative"), "stderr: {stderr}");
}

#[test]
fn dequeue_wait_run_has_no_shortfall() {
    // Concurrent schedule: only the wait handshake guarantees every task is picked up.
    let output = Command::new(bin())
        .args(["run", "6", "1", "pool:2", "dequeue=wait"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run binary");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let header = stdout.lines().next().expect("report header missing");
    assert!(header.contains("dispatched=6"), "header: {header}");
    assert!(header.contains("shortfall=0"), "header: {header}");
}

#[test]
fn unknown_dequeue_mode_is_rejected() {
    let output = Command::new(bin())
        .args(["run", "4", "dequeue=retry"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run binary");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown dequeue mode: retry"), "stderr: {stderr}");
}
