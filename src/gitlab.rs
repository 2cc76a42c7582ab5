//! Request builders for the GitLab REST API (v4).
//!
//! Paths are relative to `{host}/api/{version}`. Builders validate their
//! input and never perform I/O.

use crate::error::ToolError;
use crate::http::{encode_path_segment, ApiRequest};
use crate::tools::{
    require, AddMergeRequestCommentInput, ApproveMergeRequestInput, CompareVersionsInput,
    FetchMergeRequestDiffInput, FetchMergeRequestInput, ListMergeRequestsInput,
    MergeRequestRefInput, MR_STATES,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

fn merge_request_path(project_id: &str, iid: &str) -> Result<String, ToolError> {
    require("project_id", project_id)?;
    require("merge_request_iid", iid)?;
    Ok(format!(
        "projects/{}/merge_requests/{}",
        encode_path_segment(project_id.trim()),
        encode_path_segment(iid.trim())
    ))
}

/// `GET .../changes` for the current version, `GET .../versions/:revision` otherwise.
pub fn fetch_merge_request(input: &FetchMergeRequestInput) -> Result<ApiRequest, ToolError> {
    let base = merge_request_path(&input.project_id, &input.merge_request_iid)?;
    Ok(match &input.revision {
        Some(rev) => ApiRequest::get(format!(
            "{}/versions/{}",
            base,
            encode_path_segment(rev.trim())
        )),
        None => ApiRequest::get(format!("{}/changes", base)),
    })
}

/// First call of a merge request diff.
///
/// Without `base`/`target` this is the only call (`GET .../changes`).
/// Otherwise it lists the MR versions so both SHAs can be resolved, and
/// [`compare_resolved_versions`] builds the second call.
pub fn fetch_merge_request_diff(
    input: &FetchMergeRequestDiffInput,
) -> Result<ApiRequest, ToolError> {
    let base = merge_request_path(&input.project_id, &input.merge_request_iid)?;
    if needs_version_resolution(input) {
        Ok(ApiRequest::get(format!("{}/versions", base)))
    } else {
        Ok(ApiRequest::get(format!("{}/changes", base)))
    }
}

pub fn needs_version_resolution(input: &FetchMergeRequestDiffInput) -> bool {
    input.base.is_some() || input.target.is_some()
}

#[derive(Debug, Deserialize)]
struct MergeRequestVersion {
    id: u64,
    #[serde(default)]
    head_commit_sha: Option<String>,
    #[serde(default)]
    base_commit_sha: Option<String>,
}

/// Base and target commits picked from a merge request's version list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersions {
    pub base_label: String,
    pub target_label: String,
    pub base_sha: String,
    pub target_sha: String,
}

/// Resolve `base`/`target` version ids against the `GET .../versions` payload.
///
/// The target defaults to the newest version; the base defaults to the
/// target version's `base_commit_sha`.
pub fn resolve_versions(
    input: &FetchMergeRequestDiffInput,
    versions: &Value,
) -> Result<ResolvedVersions, ToolError> {
    let versions: Vec<MergeRequestVersion> = serde_json::from_value(versions.clone())
        .map_err(|e| ToolError::malformed(format!("merge request versions: {}", e)))?;
    if versions.is_empty() {
        return Err(ToolError::invalid(format!(
            "merge request !{} has no versions",
            input.merge_request_iid
        )));
    }
    let target = match &input.target {
        Some(t) => find_version(&versions, t)?,
        None => &versions[0],
    };
    let target_sha = head_sha(target)?;

    let (base_label, base_sha) = match &input.base {
        Some(b) => {
            let v = find_version(&versions, b)?;
            (b.trim().to_string(), head_sha(v)?)
        }
        None => {
            let sha = target.base_commit_sha.clone().ok_or_else(|| {
                ToolError::malformed(format!("version {} has no base_commit_sha", target.id))
            })?;
            (sha.clone(), sha)
        }
    };

    Ok(ResolvedVersions {
        base_label,
        target_label: input
            .target
            .as_deref()
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| target.id.to_string()),
        base_sha,
        target_sha,
    })
}

fn head_sha(v: &MergeRequestVersion) -> Result<String, ToolError> {
    v.head_commit_sha
        .clone()
        .ok_or_else(|| ToolError::malformed(format!("version {} has no head_commit_sha", v.id)))
}

fn find_version<'a>(
    versions: &'a [MergeRequestVersion],
    wanted: &str,
) -> Result<&'a MergeRequestVersion, ToolError> {
    versions
        .iter()
        .find(|v| v.id.to_string() == wanted.trim())
        .ok_or_else(|| {
            let mut ids: Vec<u64> = versions.iter().map(|v| v.id).collect();
            ids.sort_unstable();
            let available: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            ToolError::invalid(format!(
                "Version {} not found. Available versions: {}",
                wanted,
                available.join(", ")
            ))
        })
}

/// Second call of a version-to-version diff: a straight repository compare.
pub fn compare_resolved_versions(
    project_id: &str,
    resolved: &ResolvedVersions,
) -> Result<ApiRequest, ToolError> {
    require("project_id", project_id)?;
    Ok(
        repository_compare(project_id, &resolved.base_sha, &resolved.target_sha)
            .query("straight", "true"),
    )
}

fn repository_compare(project_id: &str, from: &str, to: &str) -> ApiRequest {
    ApiRequest::get(format!(
        "projects/{}/repository/compare",
        encode_path_segment(project_id.trim())
    ))
    .query("from", from)
    .query("to", to)
}

pub fn compare_versions(input: &CompareVersionsInput) -> Result<ApiRequest, ToolError> {
    require("project_id", &input.project_id)?;
    require("ref_a", &input.ref_a)?;
    require("ref_b", &input.ref_b)?;
    Ok(repository_compare(&input.project_id, input.ref_a.trim(), input.ref_b.trim()))
}

pub fn add_comment(input: &AddMergeRequestCommentInput) -> Result<ApiRequest, ToolError> {
    let base = merge_request_path(&input.project_id, &input.merge_request_iid)?;
    require("body", &input.body)?;
    Ok(ApiRequest::post(
        format!("{}/notes", base),
        Some(json!({ "body": input.body })),
    ))
}

/// `approvals_required` is only sent when given; otherwise the remote default applies.
pub fn approve(input: &ApproveMergeRequestInput) -> Result<ApiRequest, ToolError> {
    let base = merge_request_path(&input.project_id, &input.merge_request_iid)?;
    let mut body = Map::new();
    if let Some(n) = input.approvals_required {
        body.insert("approvals_required".into(), json!(n));
    }
    Ok(ApiRequest::post(format!("{}/approve", base), Some(Value::Object(body))))
}

pub fn unapprove(input: &MergeRequestRefInput) -> Result<ApiRequest, ToolError> {
    let base = merge_request_path(&input.project_id, &input.merge_request_iid)?;
    Ok(ApiRequest::post(format!("{}/unapprove", base), None))
}

pub fn list_merge_requests(input: &ListMergeRequestsInput) -> Result<ApiRequest, ToolError> {
    require("project_id", &input.project_id)?;
    let mut req = ApiRequest::get(format!(
        "projects/{}/merge_requests",
        encode_path_segment(input.project_id.trim())
    ));
    if let Some(state) = &input.state {
        let state = state.trim().to_ascii_lowercase();
        if !MR_STATES.contains(&state.as_str()) {
            return Err(ToolError::invalid(format!(
                "state must be one of {}",
                MR_STATES.join(", ")
            )));
        }
        req = req.query("state", state);
    }
    let per_page = input.per_page.unwrap_or(20);
    if per_page == 0 || per_page > 100 {
        return Err(ToolError::invalid("per_page must be 1..=100"));
    }
    req = req.query("per_page", per_page.to_string());
    if let Some(page) = input.page {
        if page == 0 {
            return Err(ToolError::invalid("page starts at 1"));
        }
        req = req.query("page", page.to_string());
    }
    Ok(req)
}
