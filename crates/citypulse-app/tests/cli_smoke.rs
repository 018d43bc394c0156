use std::process::Command;

fn run(args: &[&str]) -> std::process::Output {
    let bin = env!("CARGO_BIN_EXE_citypulse");
    Command::new(bin)
        .args(args)
        .env("RUST_LOG", "off")
        .env_remove("CITYPULSE_CONFIG")
        .env_remove("CITYPULSE_AGENTS")
        .env_remove("CITYPULSE_SEED")
        .output()
        .expect("failed to run citypulse binary")
}

#[test]
fn headless_run_streams_ndjson() {
    let output = run(&[
        "--agents",
        "300",
        "--seed",
        "7",
        "--tick-ms",
        "10",
        "--speed",
        "2",
        "--duration-secs",
        "0.6",
        "--optimize-after-secs",
        "0.2",
    ]);
    assert!(output.status.success(), "headless run failed: {output:?}");

    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is json"))
        .collect();
    assert_eq!(lines.first().map(|l| l["type"].clone()), Some("metrics".into()));
    assert!(lines.iter().any(|l| l["type"] == "snapshot" && l["n"] == 300));
    assert!(lines.iter().any(|l| l["type"] == "alert" && l["key"] == "optimize"));
}

#[test]
fn rejects_unsupported_speed() {
    let output = run(&["--speed", "3", "--duration-secs", "0"]);
    assert!(!output.status.success());
}
