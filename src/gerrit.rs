//! Request builders for the Gerrit REST API.
//!
//! Every path carries the `a/` prefix so requests are authenticated.

use crate::error::ToolError;
use crate::http::{encode_path_segment, ApiRequest};
use crate::tools::{require, AddChangeCommentInput, FetchChangeInput, FetchPatchsetDiffInput};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const CHANGE_DETAIL_OPTIONS: [&str; 8] = [
    "CURRENT_REVISION",
    "CURRENT_COMMIT",
    "MESSAGES",
    "DETAILED_LABELS",
    "DETAILED_ACCOUNTS",
    "ALL_REVISIONS",
    "ALL_FILES",
    "COMMIT_FOOTERS",
];

fn change_path(change_id: &str) -> Result<String, ToolError> {
    require("change_id", change_id)?;
    Ok(format!("a/changes/{}", encode_path_segment(change_id.trim())))
}

/// First call of `fetch_change`: change detail with every revision and its files.
pub fn change_detail(input: &FetchChangeInput) -> Result<ApiRequest, ToolError> {
    let mut req = ApiRequest::get(format!("{}/detail", change_path(&input.change_id)?));
    for opt in CHANGE_DETAIL_OPTIONS {
        req = req.query("o", opt);
    }
    Ok(req)
}

/// Second call of `fetch_change`: the formatted patch of the chosen revision.
///
/// `revision` is the literal `current` when no patchset was requested.
pub fn revision_patch(change_id: &str, revision: &RevisionRef) -> Result<ApiRequest, ToolError> {
    Ok(ApiRequest::get(format!(
        "{}/revisions/{}/patch",
        change_path(change_id)?,
        encode_path_segment(&revision.path_segment)
    ))
    .text())
}

/// First call of `fetch_patchset_diff`: all revisions, to map patchset numbers to SHAs.
pub fn patchset_revisions(input: &FetchPatchsetDiffInput) -> Result<ApiRequest, ToolError> {
    require("base_patchset", &input.base_patchset)?;
    require("target_patchset", &input.target_patchset)?;
    let path = format!("{}/detail", change_path(&input.change_id)?);
    Ok(ApiRequest::get(path).query("o", "ALL_REVISIONS"))
}

fn revision_path(change_id: &str, target: &RevisionRef) -> Result<String, ToolError> {
    Ok(format!(
        "{}/revisions/{}",
        change_path(change_id)?,
        encode_path_segment(&target.sha)
    ))
}

/// Second call of `fetch_patchset_diff`: the file list between two revisions,
/// or the diff of a single file when `file_path` is given.
pub fn patchset_files(
    input: &FetchPatchsetDiffInput,
    base: &RevisionRef,
    target: &RevisionRef,
) -> Result<ApiRequest, ToolError> {
    match input.file_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => file_diff(&input.change_id, base, target, path),
        None => Ok(ApiRequest::get(format!(
            "{}/files",
            revision_path(&input.change_id, target)?
        ))
        .query("base", base.sha.clone())),
    }
}

/// Diff of one file between two revisions.
///
/// Without `file_path`, `fetch_patchset_diff` issues one of these per file
/// of the listing, so the call count is bounded by the listed files.
pub fn file_diff(
    change_id: &str,
    base: &RevisionRef,
    target: &RevisionRef,
    path: &str,
) -> Result<ApiRequest, ToolError> {
    require("file_path", path)?;
    Ok(ApiRequest::get(format!(
        "{}/files/{}/diff",
        revision_path(change_id, target)?,
        encode_path_segment(path)
    ))
    .query("base", base.sha.clone()))
}

pub fn add_review_message(input: &AddChangeCommentInput) -> Result<ApiRequest, ToolError> {
    require("message", &input.message)?;
    let revision = input
        .patchset_number
        .as_deref()
        .map(str::trim)
        .unwrap_or("current");
    Ok(ApiRequest::post(
        format!(
            "{}/revisions/{}/review",
            change_path(&input.change_id)?,
            encode_path_segment(revision)
        ),
        Some(json!({ "message": input.message })),
    ))
}

#[derive(Debug, Deserialize)]
struct RevisionEntry {
    #[serde(rename = "_number", default)]
    number: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RevisionIndex {
    #[serde(default)]
    current_revision: Option<String>,
    #[serde(default)]
    revisions: HashMap<String, RevisionEntry>,
}

/// A revision chosen from a change detail payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRef {
    pub sha: String,
    pub number: Option<String>,
    /// Segment used in follow-up paths: `current` or the SHA.
    pub path_segment: String,
}

fn number_string(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn revision_index(detail: &Value) -> Result<RevisionIndex, ToolError> {
    serde_json::from_value(detail.clone())
        .map_err(|e| ToolError::malformed(format!("change detail: {}", e)))
}

fn find_patchset(index: &RevisionIndex, wanted: &str) -> Result<RevisionRef, ToolError> {
    let wanted = wanted.trim();
    index
        .revisions
        .iter()
        .find(|(_, rev)| rev.number.as_ref().and_then(number_string).as_deref() == Some(wanted))
        .map(|(sha, rev)| RevisionRef {
            sha: sha.clone(),
            number: rev.number.as_ref().and_then(number_string),
            path_segment: sha.clone(),
        })
        .ok_or_else(|| {
            ToolError::invalid(format!(
                "Patchset {} not found. Available patchsets: {}",
                wanted,
                available_patchsets(index).join(", ")
            ))
        })
}

fn available_patchsets(index: &RevisionIndex) -> Vec<String> {
    let mut numbers: Vec<(u64, String)> = index
        .revisions
        .values()
        .filter_map(|r| r.number.as_ref().and_then(number_string))
        .map(|n| (n.parse::<u64>().unwrap_or(u64::MAX), n))
        .collect();
    numbers.sort();
    numbers.into_iter().map(|(_, n)| n).collect()
}

/// Pick the revision for `fetch_change`: the requested patchset, or the current one.
pub fn resolve_revision(detail: &Value, patchset: Option<&str>) -> Result<RevisionRef, ToolError> {
    let index = revision_index(detail)?;
    match patchset {
        Some(ps) => find_patchset(&index, ps),
        None => {
            let sha = index
                .current_revision
                .clone()
                .ok_or_else(|| ToolError::malformed("change detail has no current_revision"))?;
            let number = index
                .revisions
                .get(&sha)
                .and_then(|r| r.number.as_ref())
                .and_then(number_string);
            Ok(RevisionRef {
                sha,
                number,
                path_segment: "current".to_string(),
            })
        }
    }
}

/// Map both patchset numbers of `fetch_patchset_diff` to revision SHAs.
pub fn resolve_patchsets(
    input: &FetchPatchsetDiffInput,
    detail: &Value,
) -> Result<(RevisionRef, RevisionRef), ToolError> {
    let index = revision_index(detail)?;
    let base = find_patchset(&index, &input.base_patchset)?;
    let target = find_patchset(&index, &input.target_patchset)?;
    Ok((base, target))
}
