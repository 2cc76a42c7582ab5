mod common;

use common::{run_one, tool_call};
use httpmock::{Method::GET, Method::POST, MockServer};
use serde_json::json;

// base64 of a one-file patch replacing "old" with "new" in src/lib.rs
const PATCH_B64: &str = "ZGlmZiAtLWdpdCBhL3NyYy9saWIucnMgYi9zcmMvbGliLnJzCi0tLSBhL3NyYy9saWIucnMKKysrIGIvc3JjL2xpYi5ycwpAQCAtMSArMSBAQAotb2xkCituZXcK";

fn call(
    server: &MockServer,
    id: i64,
    name: &str,
    args: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let host = server.base_url();
    run_one(
        tool_call(id, name, args),
        &[
            ("GERRIT_HOST", host.as_str()),
            ("GERRIT_USER", "bot"),
            ("GERRIT_HTTP_PASSWORD", "secret"),
            ("MAX_RETRIES", "0"),
        ],
    )
}

fn detail_body() -> String {
    let detail = json!({
        "id": "platform%2Fcore~main~I8a3f",
        "_number": 42,
        "project": "platform/core",
        "branch": "main",
        "subject": "Replace old with new",
        "status": "NEW",
        "owner": {"name": "Dana", "email": "dana@example.com", "username": "dana"},
        "reviewers": {"REVIEWER": [{"username": "erin"}]},
        "current_revision": "bbb",
        "revisions": {
            "aaa": {"_number": 1, "files": {"src/lib.rs": {"lines_inserted": 3}}},
            "bbb": {"_number": 2, "files": {
                "/COMMIT_MSG": {"status": "A", "lines_inserted": 7},
                "src/lib.rs": {"lines_inserted": 1, "lines_deleted": 1}
            }}
        }
    });
    format!(")]}}'\n{}", detail)
}

#[test]
fn fetch_change_reads_detail_then_current_patch() -> anyhow::Result<()> {
    let server = MockServer::start();
    let detail = server.mock(|when, then| {
        when.method(GET)
            .path("/a/changes/42/detail")
            .header("authorization", "Basic Ym90OnNlY3JldA==")
            .query_param("o", "ALL_REVISIONS");
        then.status(200).body(detail_body());
    });
    let patch = server.mock(|when, then| {
        when.method(GET).path("/a/changes/42/revisions/current/patch");
        then.status(200).body(PATCH_B64);
    });
    let v = call(&server, 1, "fetch_change", json!({"change_id": 42}))?;
    detail.assert();
    patch.assert();
    let s = &v["result"]["structuredContent"];
    assert_eq!(s["id"], "42");
    assert_eq!(s["project"], "platform/core");
    assert_eq!(s["status"], "NEW");
    assert_eq!(s["revision"], "bbb");
    assert_eq!(s["author"]["username"], "dana");
    assert_eq!(s["reviewers"][0]["username"], "erin");
    let files = s["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["path"], "src/lib.rs");
    assert!(files[0]["diff"].as_str().unwrap().contains("-old\n+new\n"));
    Ok(())
}

#[test]
fn fetch_change_for_older_patchset_uses_its_sha() -> anyhow::Result<()> {
    let server = MockServer::start();
    let detail = server.mock(|when, then| {
        when.method(GET).path("/a/changes/42/detail");
        then.status(200).body(detail_body());
    });
    let patch = server.mock(|when, then| {
        when.method(GET).path("/a/changes/42/revisions/aaa/patch");
        then.status(200).body(PATCH_B64);
    });
    let v = call(&server, 2, "fetch_change", json!({"change_id": "42", "patchset_number": 1}))?;
    detail.assert();
    patch.assert();
    assert_eq!(v["result"]["structuredContent"]["revision"], "aaa");
    Ok(())
}

#[test]
fn unknown_patchset_is_invalid_argument() -> anyhow::Result<()> {
    let server = MockServer::start();
    let detail = server.mock(|when, then| {
        when.method(GET).path("/a/changes/42/detail");
        then.status(200).body(detail_body());
    });
    let v = call(&server, 3, "fetch_change", json!({"change_id": "42", "patchset_number": 5}))?;
    detail.assert();
    assert_eq!(v["error"]["code"], -32602);
    assert!(v["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Patchset 5 not found. Available patchsets: 1, 2"));
    Ok(())
}

#[test]
fn patchset_diff_returns_every_listed_file_with_its_diff() -> anyhow::Result<()> {
    let server = MockServer::start();
    let detail = server.mock(|when, then| {
        when.method(GET)
            .path("/a/changes/42/detail")
            .query_param("o", "ALL_REVISIONS");
        then.status(200).body(detail_body());
    });
    let listing = json!({
        "/COMMIT_MSG": {"status": "A"},
        "README": {"status": "A", "lines_inserted": 1},
        "src/lib.rs": {"lines_inserted": 2, "lines_deleted": 2},
        "docs/same.md": {"status": "SAME"}
    });
    let files = server.mock(|when, then| {
        when.method(GET)
            .path("/a/changes/42/revisions/bbb/files")
            .query_param("base", "aaa");
        then.status(200).body(format!(")]}}'\n{}", listing));
    });
    let readme = server.mock(|when, then| {
        when.method(GET)
            .path("/a/changes/42/revisions/bbb/files/README/diff")
            .query_param("base", "aaa");
        then.status(200)
            .body(")]}'\n{\"change_type\":\"ADDED\",\"content\":[{\"b\":[\"hello\"]}]}");
    });
    let lib = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/a/changes/42/revisions/bbb/files/src")
            .path_contains("lib.rs/diff")
            .query_param("base", "aaa");
        then.status(200).body(
            ")]}'\n{\"content\":[{\"a\":[\"one\",\"two\"],\"b\":[\"uno\",\"dos\"]}]}",
        );
    });
    let v = call(
        &server,
        4,
        "fetch_patchset_diff",
        json!({"change_id": "42", "base_patchset": "1", "target_patchset": "2"}),
    )?;
    detail.assert();
    files.assert();
    readme.assert();
    lib.assert();
    let s = &v["result"]["structuredContent"];
    assert_eq!(s["base"], "1");
    assert_eq!(s["target"], "2");
    let listed = s["files"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["path"], "README");
    assert_eq!(listed[0]["status"], "added");
    assert_eq!(listed[0]["diff"], "+hello\n");
    assert_eq!(listed[1]["path"], "src/lib.rs");
    assert_eq!(listed[1]["insertions"], 2);
    assert_eq!(listed[1]["diff"], "-one\n-two\n+uno\n+dos\n");
    Ok(())
}

#[test]
fn patchset_diff_for_one_file_renders_content() -> anyhow::Result<()> {
    let server = MockServer::start();
    let _detail = server.mock(|when, then| {
        when.method(GET).path("/a/changes/42/detail");
        then.status(200).body(detail_body());
    });
    let diff = server.mock(|when, then| {
        when.method(GET)
            .path_contains("/a/changes/42/revisions/bbb/files/src")
            .path_contains("lib.rs/diff")
            .query_param("base", "aaa");
        let info = json!({
            "change_type": "MODIFIED",
            "meta_b": {"name": "src/lib.rs"},
            "content": [{"ab": ["keep"]}, {"a": ["old"], "b": ["new"]}]
        });
        then.status(200).body(format!(")]}}'\n{}", info));
    });
    let v = call(&server, 5, "fetch_patchset_diff", json!({
        "change_id": 42, "base_patchset": 1, "target_patchset": 2, "file_path": "src/lib.rs"
    }))?;
    diff.assert();
    let f = &v["result"]["structuredContent"]["files"][0];
    assert_eq!(f["path"], "src/lib.rs");
    assert_eq!(f["diff"], " keep\n-old\n+new\n");
    assert_eq!(f["insertions"], 1);
    assert_eq!(f["deletions"], 1);
    Ok(())
}

#[test]
fn review_message_goes_to_current_revision() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(POST)
            .path("/a/changes/42/revisions/current/review")
            .json_body(json!({"message": "Please rebase"}));
        then.status(200).body(")]}'\n{}");
    });
    let args = json!({"change_id": "42", "message": "Please rebase"});
    let v = call(&server, 6, "add_change_comment", args)?;
    m.assert();
    assert_eq!(v["result"]["structuredContent"]["success"], true);
    Ok(())
}

#[test]
fn garbage_detail_is_malformed_response() -> anyhow::Result<()> {
    let server = MockServer::start();
    let _detail = server.mock(|when, then| {
        when.method(GET).path("/a/changes/42/detail");
        then.status(200).body("<html>maintenance</html>");
    });
    let v = call(&server, 7, "fetch_change", json!({"change_id": "42"}))?;
    assert_eq!(v["result"]["isError"], true);
    assert_eq!(v["result"]["structuredContent"]["error"]["kind"], "malformed_response");
    Ok(())
}
