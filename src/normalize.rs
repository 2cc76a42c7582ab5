//! Raw GitLab/Gerrit payloads to tool result entities.
//!
//! Missing optional fields take defaults (empty lists, zero counts, `None`);
//! unrecognized fields are ignored. Only payloads that cannot be read at all
//! produce `MalformedResponse`. Diff text is passed through unchanged.

use crate::error::ToolError;
use crate::gerrit::RevisionRef;
use crate::gitlab::ResolvedVersions;
use crate::http::RawResponse;
use crate::types::{
    ApprovalResult, ChangeSummary, CommentResult, FileDelta, MergeRequestItem, MergeRequestList,
    Meta, PatchsetDiff, Person, VersionComparison,
};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

const GERRIT_XSSI_PREFIX: &str = ")]}'";
const GERRIT_MAGIC_FILES: [&str; 3] = ["/COMMIT_MSG", "/MERGE_LIST", "/PATCHSET_LEVEL"];

/// Parse a JSON body; an empty body reads as `null`.
pub fn json_body(raw: &RawResponse) -> Result<Value, ToolError> {
    parse_json(&raw.body)
}

/// Parse a Gerrit JSON body, dropping the `)]}'` XSSI guard.
pub fn gerrit_json_body(raw: &RawResponse) -> Result<Value, ToolError> {
    let body = raw.body.trim_start();
    parse_json(body.strip_prefix(GERRIT_XSSI_PREFIX).unwrap_or(body))
}

fn parse_json(body: &str) -> Result<Value, ToolError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ToolError::malformed(format!("invalid JSON: {}", e)))
}

fn decode<T: DeserializeOwned + Default>(what: &str, value: &Value) -> Result<T, ToolError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| ToolError::malformed(format!("{}: {}", what, e)))
}

fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Count added and removed lines of a unified diff, ignoring file headers.
pub fn count_diff_lines(diff: &str) -> (u64, u64) {
    let mut in_hunk = !diff.contains("\n@@") && !diff.starts_with("@@");
    let (mut ins, mut del) = (0u64, 0u64);
    for line in diff.lines() {
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if line.starts_with("diff --git ") {
            in_hunk = false;
            continue;
        }
        if !in_hunk {
            continue;
        }
        if line.starts_with('+') {
            ins += 1;
        } else if line.starts_with('-') {
            del += 1;
        }
    }
    (ins, del)
}

fn matches_path(delta: &FileDelta, wanted: Option<&str>) -> bool {
    match wanted.map(str::trim).filter(|p| !p.is_empty()) {
        None => true,
        Some(p) => delta.path == p || delta.old_path.as_deref() == Some(p),
    }
}

fn filter_files(files: Vec<FileDelta>, file_path: Option<&str>) -> Vec<FileDelta> {
    files.into_iter().filter(|f| matches_path(f, file_path)).collect()
}

// GitLab

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabUser {
    username: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

impl From<GitLabUser> for Person {
    fn from(u: GitLabUser) -> Self {
        Person {
            username: u.username,
            name: u.name,
            email: u.email,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabDiff {
    old_path: Option<String>,
    new_path: Option<String>,
    new_file: bool,
    renamed_file: bool,
    deleted_file: bool,
    diff: Option<String>,
}

impl GitLabDiff {
    fn into_delta(self) -> FileDelta {
        let status = if self.new_file {
            "added"
        } else if self.deleted_file {
            "deleted"
        } else if self.renamed_file {
            "renamed"
        } else {
            "modified"
        };
        let path = self
            .new_path
            .clone()
            .or_else(|| self.old_path.clone())
            .unwrap_or_default();
        let old_path = self.old_path.filter(|old| *old != path);
        let (insertions, deletions) = self.diff.as_deref().map(count_diff_lines).unwrap_or((0, 0));
        FileDelta {
            path,
            old_path,
            status: status.to_string(),
            insertions,
            deletions,
            diff: self.diff,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiffRefs {
    base_sha: Option<String>,
    head_sha: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabMergeRequest {
    iid: Option<Value>,
    project_id: Option<Value>,
    title: Option<String>,
    state: Option<String>,
    source_branch: Option<String>,
    target_branch: Option<String>,
    author: Option<GitLabUser>,
    reviewers: Vec<GitLabUser>,
    web_url: Option<String>,
    sha: Option<String>,
    diff_refs: Option<DiffRefs>,
    changes: Vec<GitLabDiff>,
}

impl GitLabMergeRequest {
    fn files(&mut self) -> Vec<FileDelta> {
        std::mem::take(&mut self.changes)
            .into_iter()
            .map(GitLabDiff::into_delta)
            .collect()
    }
}

/// `GET .../merge_requests/:iid/changes` payload.
pub fn merge_request_summary(payload: &Value) -> Result<ChangeSummary, ToolError> {
    let mut mr: GitLabMergeRequest = decode("merge request", payload)?;
    let files = mr.files();
    Ok(ChangeSummary {
        id: mr.iid.as_ref().and_then(value_string).unwrap_or_default(),
        title: mr.title,
        project: mr
            .project_id
            .as_ref()
            .and_then(value_string)
            .unwrap_or_default(),
        source_branch: mr.source_branch,
        target_branch: mr.target_branch,
        author: mr.author.map(Person::from),
        reviewers: mr.reviewers.into_iter().map(Person::from).collect(),
        status: mr.state.unwrap_or_else(|| "unknown".to_string()),
        revision: mr.sha,
        web_url: mr.web_url,
        files,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabVersion {
    head_commit_sha: Option<String>,
    diffs: Vec<GitLabDiff>,
}

/// `GET .../merge_requests/:iid/versions/:id` payload.
///
/// A version only describes a diff. Its `state` is the diff collection
/// state, so the MR status is reported as `unknown`, and identity comes
/// from the caller's own arguments.
pub fn merge_request_version_summary(
    project_id: &str,
    iid: &str,
    payload: &Value,
) -> Result<ChangeSummary, ToolError> {
    let version: GitLabVersion = decode("merge request version", payload)?;
    Ok(ChangeSummary {
        id: iid.to_string(),
        title: None,
        project: project_id.to_string(),
        source_branch: None,
        target_branch: None,
        author: None,
        reviewers: Vec::new(),
        status: "unknown".to_string(),
        revision: version.head_commit_sha,
        web_url: None,
        files: version.diffs.into_iter().map(GitLabDiff::into_delta).collect(),
    })
}

/// Single-call MR diff (`GET .../changes`), bounded by the MR's diff refs.
pub fn merge_request_diff(
    payload: &Value,
    file_path: Option<&str>,
) -> Result<PatchsetDiff, ToolError> {
    let mut mr: GitLabMergeRequest = decode("merge request", payload)?;
    let files = filter_files(mr.files(), file_path);
    let refs = mr.diff_refs.unwrap_or_default();
    let base_revision = refs.base_sha;
    let target_revision = refs.head_sha.or(mr.sha);
    Ok(PatchsetDiff {
        base: mr
            .target_branch
            .clone()
            .or_else(|| base_revision.clone())
            .unwrap_or_default(),
        target: mr
            .source_branch
            .clone()
            .or_else(|| target_revision.clone())
            .unwrap_or_default(),
        base_revision,
        target_revision,
        files,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabCompare {
    commits: Vec<Value>,
    diffs: Vec<GitLabDiff>,
    compare_timeout: bool,
    compare_same_ref: bool,
}

pub fn version_comparison(
    base: &str,
    target: &str,
    payload: &Value,
) -> Result<VersionComparison, ToolError> {
    let cmp: GitLabCompare = decode("repository compare", payload)?;
    Ok(VersionComparison {
        base: base.to_string(),
        target: target.to_string(),
        commit_count: cmp.commits.len(),
        same_ref: cmp.compare_same_ref,
        timed_out: cmp.compare_timeout,
        files: cmp.diffs.into_iter().map(GitLabDiff::into_delta).collect(),
    })
}

/// Second call of a version-to-version MR diff.
pub fn resolved_version_diff(
    resolved: &ResolvedVersions,
    payload: &Value,
    file_path: Option<&str>,
) -> Result<PatchsetDiff, ToolError> {
    let cmp: GitLabCompare = decode("repository compare", payload)?;
    let files = cmp.diffs.into_iter().map(GitLabDiff::into_delta).collect();
    Ok(PatchsetDiff {
        base: resolved.base_label.clone(),
        target: resolved.target_label.clone(),
        base_revision: Some(resolved.base_sha.clone()),
        target_revision: Some(resolved.target_sha.clone()),
        files: filter_files(files, file_path),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabNote {
    id: Option<Value>,
}

pub fn merge_request_comment(iid: &str, payload: &Value) -> Result<CommentResult, ToolError> {
    let note: GitLabNote = decode("note", payload)?;
    Ok(CommentResult {
        success: true,
        message: format!("Comment added to merge request !{}", iid),
        comment_id: note.id.as_ref().and_then(value_string),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApprovedBy {
    user: Option<GitLabUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabApprovals {
    approvals_required: Option<u32>,
    approvals_left: Option<u32>,
    approved_by: Vec<ApprovedBy>,
}

pub fn approval(iid: &str, approved: bool, payload: &Value) -> Result<ApprovalResult, ToolError> {
    let state: GitLabApprovals = decode("approval state", payload)?;
    let verb = if approved { "approved" } else { "unapproved" };
    Ok(ApprovalResult {
        success: true,
        message: format!("Merge request !{} {}", iid, verb),
        approvals_required: state.approvals_required,
        approvals_left: state.approvals_left,
        approved_by: state
            .approved_by
            .into_iter()
            .filter_map(|a| a.user.and_then(|u| u.username))
            .collect(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitLabListItem {
    iid: u64,
    title: String,
    state: String,
    source_branch: String,
    target_branch: String,
    author: Option<GitLabUser>,
    web_url: Option<String>,
    updated_at: Option<String>,
}

pub fn merge_request_list(
    payload: &Value,
    next_page: Option<&str>,
) -> Result<MergeRequestList, ToolError> {
    let items: Vec<GitLabListItem> = decode("merge request list", payload)?;
    Ok(MergeRequestList {
        items: items
            .into_iter()
            .map(|i| MergeRequestItem {
                iid: i.iid,
                title: i.title,
                state: i.state,
                source_branch: i.source_branch,
                target_branch: i.target_branch,
                author: i.author.map(Person::from),
                web_url: i.web_url,
                updated_at: i.updated_at,
            })
            .collect(),
        meta: Meta {
            has_more: next_page.is_some(),
            next_page: next_page.map(str::to_string),
        },
    })
}

// Gerrit

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GerritAccount {
    name: Option<String>,
    email: Option<String>,
    username: Option<String>,
}

impl From<GerritAccount> for Person {
    fn from(a: GerritAccount) -> Self {
        Person {
            username: a.username,
            name: a.name,
            email: a.email,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GerritFileInfo {
    status: Option<String>,
    old_path: Option<String>,
    lines_inserted: u64,
    lines_deleted: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GerritRevision {
    files: BTreeMap<String, GerritFileInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GerritChange {
    id: Option<String>,
    #[serde(rename = "_number")]
    number: Option<Value>,
    project: Option<String>,
    branch: Option<String>,
    subject: Option<String>,
    status: Option<String>,
    owner: Option<GerritAccount>,
    reviewers: HashMap<String, Vec<GerritAccount>>,
    revisions: HashMap<String, GerritRevision>,
}

fn gerrit_status(code: Option<&str>) -> &'static str {
    match code {
        Some("A") => "added",
        Some("D") => "deleted",
        Some("R") => "renamed",
        Some("C") => "copied",
        Some("W") => "rewritten",
        _ => "modified",
    }
}

fn gerrit_files(
    files: BTreeMap<String, GerritFileInfo>,
    diffs: &HashMap<String, String>,
) -> Vec<FileDelta> {
    files
        .into_iter()
        .filter(|(path, info)| {
            !GERRIT_MAGIC_FILES.contains(&path.as_str()) && info.status.as_deref() != Some("SAME")
        })
        .map(|(path, info)| FileDelta {
            diff: diffs.get(&path).cloned(),
            status: gerrit_status(info.status.as_deref()).to_string(),
            old_path: info.old_path,
            insertions: info.lines_inserted,
            deletions: info.lines_deleted,
            path,
        })
        .collect()
}

/// Decode the base64 body of `GET .../revisions/:rev/patch`.
pub fn decode_patch(raw: &RawResponse) -> Result<String, ToolError> {
    let compact: String = raw.body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Ok(String::new());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ToolError::malformed(format!("patch is not base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ToolError::malformed(format!("patch is not UTF-8: {}", e)))
}

/// Split a git formatted patch into per-file sections keyed by new path.
pub fn split_patch(patch: &str) -> HashMap<String, String> {
    let mut sections: Vec<String> = Vec::new();
    for line in patch.split_inclusive('\n') {
        if line.starts_with("diff --git ") {
            sections.push(String::new());
        }
        if let Some(current) = sections.last_mut() {
            current.push_str(line);
        }
    }
    sections
        .into_iter()
        .filter_map(|section| section_path(&section).map(|p| (p, section)))
        .collect()
}

fn section_path(section: &str) -> Option<String> {
    let mut header_path = None;
    let mut old_path = None;
    for line in section.lines() {
        if line.starts_with("@@") {
            break;
        }
        if let Some(rest) = line.strip_prefix("+++ ") {
            if rest != "/dev/null" {
                return Some(rest.strip_prefix("b/").unwrap_or(rest).to_string());
            }
        } else if let Some(rest) = line.strip_prefix("--- ") {
            if rest != "/dev/null" {
                old_path = Some(rest.strip_prefix("a/").unwrap_or(rest).to_string());
            }
        } else if let Some(rest) = line.strip_prefix("diff --git ") {
            header_path = rest.rsplit_once(" b/").map(|(_, b)| b.to_string());
        }
    }
    header_path.or(old_path)
}

pub fn gerrit_change_summary(
    detail: &Value,
    revision: &RevisionRef,
    patch: &str,
) -> Result<ChangeSummary, ToolError> {
    let mut change: GerritChange = decode("change detail", detail)?;
    let project = change
        .project
        .take()
        .ok_or_else(|| ToolError::malformed("change detail has no project"))?;
    let diffs = split_patch(patch);
    let files = change
        .revisions
        .remove(&revision.sha)
        .map(|r| gerrit_files(r.files, &diffs))
        .unwrap_or_default();
    let reviewers = change
        .reviewers
        .remove("REVIEWER")
        .unwrap_or_default()
        .into_iter()
        .map(Person::from)
        .collect();
    Ok(ChangeSummary {
        id: change
            .number
            .as_ref()
            .and_then(value_string)
            .or(change.id)
            .unwrap_or_default(),
        title: change.subject,
        project,
        source_branch: None,
        target_branch: change.branch,
        author: change.owner.map(Person::from),
        reviewers,
        status: change.status.unwrap_or_else(|| "UNKNOWN".to_string()),
        revision: Some(revision.sha.clone()),
        web_url: None,
        files,
    })
}

fn patchset_label(r: &RevisionRef) -> String {
    r.number.clone().unwrap_or_else(|| r.sha.clone())
}

/// `GET .../revisions/:target/files?base=:base` payload.
pub fn gerrit_patchset_files(
    base: &RevisionRef,
    target: &RevisionRef,
    payload: &Value,
) -> Result<PatchsetDiff, ToolError> {
    let files: BTreeMap<String, GerritFileInfo> = decode("file list", payload)?;
    Ok(PatchsetDiff {
        base: patchset_label(base),
        target: patchset_label(target),
        base_revision: Some(base.sha.clone()),
        target_revision: Some(target.sha.clone()),
        files: gerrit_files(files, &HashMap::new()),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiffMeta {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiffChunk {
    a: Vec<String>,
    b: Vec<String>,
    ab: Vec<String>,
    skip: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GerritDiffInfo {
    meta_a: Option<DiffMeta>,
    meta_b: Option<DiffMeta>,
    change_type: Option<String>,
    content: Vec<DiffChunk>,
}

/// Render `DiffInfo.content` as unified-style lines.
fn render_diff_content(chunks: &[DiffChunk]) -> (String, u64, u64) {
    let mut out = String::new();
    let (mut ins, mut del) = (0u64, 0u64);
    for chunk in chunks {
        if let Some(n) = chunk.skip {
            out.push_str(&format!("@@ {} unchanged lines @@\n", n));
        }
        for line in &chunk.ab {
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
        for line in &chunk.a {
            out.push('-');
            out.push_str(line);
            out.push('\n');
            del += 1;
        }
        for line in &chunk.b {
            out.push('+');
            out.push_str(line);
            out.push('\n');
            ins += 1;
        }
    }
    (out, ins, del)
}

fn decode_diff_info(payload: &Value) -> Result<GerritDiffInfo, ToolError> {
    decode("file diff", payload)
}

/// `GET .../files/:path/diff?base=:base` payload, as a single file delta.
pub fn gerrit_file_diff(
    base: &RevisionRef,
    target: &RevisionRef,
    requested_path: &str,
    payload: &Value,
) -> Result<PatchsetDiff, ToolError> {
    let info = decode_diff_info(payload)?;
    let (diff, insertions, deletions) = render_diff_content(&info.content);
    let path = info
        .meta_b
        .as_ref()
        .and_then(|m| m.name.clone())
        .unwrap_or_else(|| requested_path.to_string());
    let old_path = info
        .meta_a
        .and_then(|m| m.name)
        .filter(|old| *old != path);
    let status = match info.change_type.as_deref() {
        Some("ADDED") => "added",
        Some("DELETED") => "deleted",
        Some("RENAMED") => "renamed",
        Some("COPIED") => "copied",
        Some("REWRITE") => "rewritten",
        _ => "modified",
    };
    Ok(PatchsetDiff {
        base: patchset_label(base),
        target: patchset_label(target),
        base_revision: Some(base.sha.clone()),
        target_revision: Some(target.sha.clone()),
        files: vec![FileDelta {
            path,
            old_path,
            status: status.to_string(),
            insertions,
            deletions,
            diff: Some(diff),
        }],
    })
}

/// Fill a listed file's diff text from its `DiffInfo`.
///
/// Counts stay as the file listing reported them.
pub fn attach_file_diff(delta: &mut FileDelta, payload: &Value) -> Result<(), ToolError> {
    let info = decode_diff_info(payload)?;
    let (diff, _, _) = render_diff_content(&info.content);
    delta.diff = Some(diff);
    Ok(())
}

pub fn gerrit_review_posted(change_id: &str, payload: &Value) -> Result<CommentResult, ToolError> {
    if !(payload.is_null() || payload.is_object()) {
        return Err(ToolError::malformed("review result is not an object"));
    }
    Ok(CommentResult {
        success: true,
        message: format!("Review message posted on change {}", change_id),
        comment_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn raw(body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::OK,
            body: body.to_string(),
            next_page: None,
        }
    }

    fn revision(sha: &str, number: &str) -> RevisionRef {
        RevisionRef {
            sha: sha.into(),
            number: Some(number.into()),
            path_segment: sha.into(),
        }
    }

    const PATCH: &str = "From abc Mon Sep 17 00:00:00 2001\n\
Subject: [PATCH] Fix things\n\
\n\
---\n\
 src/lib.rs | 2 +-\n\
\n\
diff --git a/src/lib.rs b/src/lib.rs\n\
index 1..2 100644\n\
--- a/src/lib.rs\n\
+++ b/src/lib.rs\n\
@@ -1,2 +1,2 @@\n\
 fn a() {}\n\
-fn b() {}\n\
+fn c() {}\n\
diff --git a/old.txt b/old.txt\n\
deleted file mode 100644\n\
--- a/old.txt\n\
+++ /dev/null\n\
@@ -1 +0,0 @@\n\
---removed dashes\n";

    #[test]
    fn merge_request_without_changes_has_empty_files() {
        let payload = json!({"iid": 5, "project_id": 9, "title": "t", "changes": []});
        let s = merge_request_summary(&payload).unwrap();
        assert!(s.files.is_empty());
        let s = merge_request_summary(&json!({"iid": 5})).unwrap();
        assert!(s.files.is_empty());
        assert_eq!(s.status, "unknown");
        assert_eq!(s.project, "");
    }

    #[test]
    fn merge_request_summary_maps_fields_and_counts_lines() {
        let payload = json!({
            "iid": 42, "project_id": 123, "title": "Add feature", "state": "opened",
            "source_branch": "feature", "target_branch": "main",
            "author": {"username": "alice", "name": "Alice"},
            "reviewers": [{"username": "bob"}],
            "sha": "deadbeef", "web_url": "https://gitlab.example.com/g/p/-/merge_requests/42",
            "unexpected_field": {"ignored": true},
            "changes": [
                {
                    "old_path": "a.rs",
                    "new_path": "a.rs",
                    "diff": "@@ -1,2 +1,3 @@\n ctx\n-old\n+new\n+more\n"
                },
                {"old_path": "x.rs", "new_path": "y.rs", "renamed_file": true, "diff": ""},
                {"old_path": "n.rs", "new_path": "n.rs", "new_file": true}
            ]
        });
        let s = merge_request_summary(&payload).unwrap();
        assert_eq!(s.id, "42");
        assert_eq!(s.project, "123");
        assert_eq!(s.author.unwrap().username.as_deref(), Some("alice"));
        assert_eq!(s.reviewers.len(), 1);
        assert_eq!(s.revision.as_deref(), Some("deadbeef"));
        assert_eq!(s.files.len(), 3);
        assert_eq!((s.files[0].insertions, s.files[0].deletions), (2, 1));
        assert_eq!(s.files[0].diff.as_deref(), Some("@@ -1,2 +1,3 @@\n ctx\n-old\n+new\n+more\n"));
        assert_eq!(s.files[1].status, "renamed");
        assert_eq!(s.files[1].old_path.as_deref(), Some("x.rs"));
        assert_eq!(s.files[2].status, "added");
        assert_eq!(s.files[2].diff, None);
    }

    #[test]
    fn version_payload_keeps_caller_identity() {
        let payload = json!({
            "id": 900,
            "head_commit_sha": "33e2ee85",
            "base_commit_sha": "eeb57dff",
            "start_commit_sha": "eeb57dff",
            "created_at": "2016-07-26T14:44:48.926Z",
            "merge_request_id": 555001,
            "state": "collected",
            "real_size": "1",
            "commits": [{"id": "33e2ee85", "title": "Change year to 2018"}],
            "diffs": [{
                "old_path": "LICENSE", "new_path": "LICENSE",
                "a_mode": "0100644", "b_mode": "100644",
                "diff": "@@ -1,4 +1,4 @@\n-Copyright (c) 2017\n+Copyright (c) 2018\n",
                "new_file": false, "renamed_file": false, "deleted_file": false
            }]
        });
        let s = merge_request_version_summary("group/app", "42", &payload).unwrap();
        assert_eq!(s.id, "42");
        assert_eq!(s.project, "group/app");
        assert_eq!(s.status, "unknown");
        assert_eq!(s.revision.as_deref(), Some("33e2ee85"));
        assert_eq!(s.files.len(), 1);
        assert_eq!((s.files[0].insertions, s.files[0].deletions), (1, 1));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let err = merge_request_summary(&json!("not a merge request")).unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
        assert!(json_body(&raw("<html>")).is_err());
        assert_eq!(json_body(&raw("  ")).unwrap(), Value::Null);
    }

    #[test]
    fn comparison_keeps_requested_refs() {
        let cmp = version_comparison(
            "develop",
            "master",
            &json!({
                "commits": [{"id": "1"}, {"id": "2"}],
                "diffs": [{"new_path": "f", "diff": "@@ -0,0 +1 @@\n+x\n"}]
            }),
        )
        .unwrap();
        assert_eq!(cmp.base, "develop");
        assert_eq!(cmp.target, "master");
        assert_eq!(cmp.commit_count, 2);
        assert_eq!(cmp.files[0].insertions, 1);
    }

    #[test]
    fn mr_diff_filters_by_path() {
        let payload = json!({
            "target_branch": "main", "source_branch": "feat",
            "diff_refs": {"base_sha": "b", "head_sha": "h"},
            "changes": [{"new_path": "keep.rs", "diff": ""}, {"new_path": "drop.rs", "diff": ""}]
        });
        let d = merge_request_diff(&payload, Some("keep.rs")).unwrap();
        assert_eq!(d.files.len(), 1);
        assert_eq!(d.base, "main");
        assert_eq!(d.base_revision.as_deref(), Some("b"));
        assert_eq!(d.target_revision.as_deref(), Some("h"));
    }

    #[test]
    fn approval_state_is_optional() {
        let a = approval("7", true, &json!({
            "approvals_required": 2, "approvals_left": 1,
            "approved_by": [{"user": {"username": "carol"}}]
        }))
        .unwrap();
        assert_eq!(a.approvals_required, Some(2));
        assert_eq!(a.approved_by, vec!["carol".to_string()]);
        let u = approval("7", false, &Value::Null).unwrap();
        assert!(u.success);
        assert_eq!(u.approvals_left, None);
        assert_eq!(u.message, "Merge request !7 unapproved");
    }

    #[test]
    fn list_reports_next_page() {
        let payload = json!([{
            "iid": 1,
            "title": "a",
            "state": "opened",
            "source_branch": "s",
            "target_branch": "t"
        }]);
        let l = merge_request_list(&payload, Some("2")).unwrap();
        assert_eq!(l.items.len(), 1);
        assert!(l.meta.has_more);
        let l = merge_request_list(&json!([]), None).unwrap();
        assert!(!l.meta.has_more);
    }

    #[test]
    fn gerrit_xssi_prefix_is_stripped() {
        let v = gerrit_json_body(&raw(")]}'\n{\"project\":\"p\"}")).unwrap();
        assert_eq!(v["project"], "p");
    }

    #[test]
    fn patch_splits_per_file_and_counts_only_hunk_lines() {
        let sections = split_patch(PATCH);
        assert_eq!(sections.len(), 2);
        let lib = &sections["src/lib.rs"];
        assert!(lib.starts_with("diff --git a/src/lib.rs b/src/lib.rs\n"));
        assert_eq!(count_diff_lines(lib), (1, 1));
        assert_eq!(count_diff_lines(&sections["old.txt"]), (0, 1));
    }

    #[test]
    fn gerrit_summary_merges_detail_and_patch() {
        let detail = json!({
            "_number": 4711, "project": "platform/core", "branch": "main", "subject": "Fix things",
            "status": "NEW", "owner": {"name": "Dana", "email": "dana@example.com"},
            "reviewers": {"REVIEWER": [{"username": "erin"}], "CC": [{"username": "frank"}]},
            "current_revision": "abc",
            "revisions": {"abc": {"_number": 3, "files": {
                "/COMMIT_MSG": {"status": "A", "lines_inserted": 10},
                "src/lib.rs": {"lines_inserted": 1, "lines_deleted": 1},
                "old.txt": {"status": "D", "lines_deleted": 1}
            }}}
        });
        let rev = RevisionRef {
            sha: "abc".into(),
            number: Some("3".into()),
            path_segment: "current".into(),
        };
        let s = gerrit_change_summary(&detail, &rev, PATCH).unwrap();
        assert_eq!(s.id, "4711");
        assert_eq!(s.project, "platform/core");
        assert_eq!(s.reviewers.len(), 1);
        assert_eq!(s.files.len(), 2);
        assert_eq!(s.files[0].path, "old.txt");
        assert_eq!(s.files[0].status, "deleted");
        assert!(s.files[1].diff.as_deref().unwrap().contains("+fn c() {}"));
    }

    #[test]
    fn gerrit_summary_requires_project() {
        let rev = RevisionRef {
            sha: "abc".into(),
            number: None,
            path_segment: "current".into(),
        };
        let err = gerrit_change_summary(&json!({"revisions": {}}), &rev, "").unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
    }

    #[test]
    fn patch_body_is_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("diff --git a/x b/x\n");
        let wrapped = format!("{}\n{}\n", &encoded[..8], &encoded[8..]);
        assert_eq!(decode_patch(&raw(&wrapped)).unwrap(), "diff --git a/x b/x\n");
        assert!(decode_patch(&raw("%%%")).is_err());
    }

    #[test]
    fn gerrit_file_list_skips_same_and_magic_files() {
        let (base, target) = (revision("a1", "1"), revision("b2", "2"));
        let d = gerrit_patchset_files(&base, &target, &json!({
            "/COMMIT_MSG": {"status": "A"},
            "same.rs": {"status": "SAME"},
            "moved.rs": {"status": "R", "old_path": "orig.rs", "lines_inserted": 3}
        }))
        .unwrap();
        assert_eq!(d.base, "1");
        assert_eq!(d.target, "2");
        assert_eq!(d.files.len(), 1);
        assert_eq!(d.files[0].old_path.as_deref(), Some("orig.rs"));
        assert_eq!(d.files[0].status, "renamed");
    }

    #[test]
    fn listed_file_gets_rendered_diff() {
        let mut delta = FileDelta {
            path: "a.txt".into(),
            old_path: None,
            status: "modified".into(),
            insertions: 1,
            deletions: 0,
            diff: None,
        };
        attach_file_diff(&mut delta, &json!({"content": [{"ab": ["x"]}, {"b": ["y"]}]})).unwrap();
        assert_eq!(delta.diff.as_deref(), Some(" x\n+y\n"));
        assert_eq!(delta.insertions, 1);
        assert!(attach_file_diff(&mut delta, &json!("nope")).is_err());
    }

    #[test]
    fn gerrit_diff_info_renders_lines() {
        let (base, target) = (revision("a1", "1"), revision("b2", "2"));
        let d = gerrit_file_diff(&base, &target, "f.txt", &json!({
            "meta_a": {"name": "f.txt"}, "meta_b": {"name": "f.txt"}, "change_type": "MODIFIED",
            "content": [{"ab": ["same"]}, {"a": ["old"], "b": ["new", "extra"]}, {"skip": 40}]
        }))
        .unwrap();
        let f = &d.files[0];
        assert_eq!(
            f.diff.as_deref(),
            Some(" same\n-old\n+new\n+extra\n@@ 40 unchanged lines @@\n")
        );
        assert_eq!((f.insertions, f.deletions), (2, 1));
        assert_eq!(f.old_path, None);
    }
}
