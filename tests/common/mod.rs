#![allow(dead_code)]

use assert_cmd::Command;

const CONFIG_VARS: [&str; 11] = [
    "GITLAB_HOST",
    "GITLAB_TOKEN",
    "GITLAB_API_VERSION",
    "GERRIT_HOST",
    "GERRIT_USER",
    "GERRIT_HTTP_PASSWORD",
    "REQUEST_TIMEOUT",
    "MAX_RETRIES",
    "USER_AGENT",
    "LOG_LEVEL",
    "DEBUG",
];

/// Feed one JSON-RPC message per line to the binary and collect the
/// responses it writes, one per line.
pub fn run_session(
    requests: &[serde_json::Value],
    envs: &[(&str, &str)],
) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut cmd = Command::cargo_bin("review-mcp")?;
    for k in CONFIG_VARS {
        cmd.env_remove(k);
    }
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut input = String::new();
    for r in requests {
        input.push_str(&serde_json::to_string(r)?);
        input.push('\n');
    }
    let assert = cmd
        .arg("--log-level")
        .arg("warn")
        .write_stdin(input)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(anyhow::Error::from))
        .collect()
}

pub fn run_one(
    request: serde_json::Value,
    envs: &[(&str, &str)],
) -> anyhow::Result<serde_json::Value> {
    let mut out = run_session(&[request], envs)?;
    anyhow::ensure!(out.len() == 1, "expected one response, got {}", out.len());
    Ok(out.remove(0))
}

pub fn tool_call(id: i64, name: &str, arguments: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0", "id": id, "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}
