use crate::error::ToolError;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Every tool this server exposes. Dispatch matches on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    FetchMergeRequest,
    FetchMergeRequestDiff,
    CompareVersions,
    AddMergeRequestComment,
    ApproveMergeRequest,
    UnapproveMergeRequest,
    ListMergeRequests,
    FetchChange,
    FetchPatchsetDiff,
    AddChangeComment,
}

impl Tool {
    pub const ALL: [Tool; 10] = [
        Tool::FetchMergeRequest,
        Tool::FetchMergeRequestDiff,
        Tool::CompareVersions,
        Tool::AddMergeRequestComment,
        Tool::ApproveMergeRequest,
        Tool::UnapproveMergeRequest,
        Tool::ListMergeRequests,
        Tool::FetchChange,
        Tool::FetchPatchsetDiff,
        Tool::AddChangeComment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::FetchMergeRequest => "fetch_merge_request",
            Tool::FetchMergeRequestDiff => "fetch_merge_request_diff",
            Tool::CompareVersions => "compare_versions",
            Tool::AddMergeRequestComment => "add_merge_request_comment",
            Tool::ApproveMergeRequest => "approve_merge_request",
            Tool::UnapproveMergeRequest => "unapprove_merge_request",
            Tool::ListMergeRequests => "list_merge_requests",
            Tool::FetchChange => "fetch_change",
            Tool::FetchPatchsetDiff => "fetch_patchset_diff",
            Tool::AddChangeComment => "add_change_comment",
        }
    }

    pub fn from_name(name: &str) -> Result<Tool, ToolError> {
        Tool::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn is_gerrit(self) -> bool {
        matches!(
            self,
            Tool::FetchChange | Tool::FetchPatchsetDiff | Tool::AddChangeComment
        )
    }

    pub fn descriptor(self) -> ToolDescriptor {
        let (description, input_schema) = match self {
            Tool::FetchMergeRequest => (
                "Fetch a GitLab merge request with its changed files and diffs. \
                 Uses the current version unless `revision` (an MR version id) is given.",
                schema(
                    serde_json::json!({
                        "project_id": id_prop("Project ID or URL-encodable path (group/project)"),
                        "merge_request_iid": id_prop("Merge request IID"),
                        "revision":
                            id_prop("Merge request version id; defaults to the current version")
                    }),
                    &["project_id", "merge_request_iid"],
                ),
            ),
            Tool::FetchMergeRequestDiff => (
                "Fetch the diff of a GitLab merge request, optionally between two MR versions \
                 and restricted to one file.",
                schema(
                    serde_json::json!({
                        "project_id": id_prop("Project ID or path"),
                        "merge_request_iid": id_prop("Merge request IID"),
                        "base": id_prop("Base MR version id"),
                        "target": id_prop("Target MR version id"),
                        "file_path": {"type": "string", "description": "Only return this file"}
                    }),
                    &["project_id", "merge_request_iid"],
                ),
            ),
            Tool::CompareVersions => (
                "Compare two branches, tags or commits of a GitLab project.",
                schema(
                    serde_json::json!({
                        "project_id": id_prop("Project ID or path"),
                        "ref_a": {"type": "string", "description": "Base ref (compare from)"},
                        "ref_b": {"type": "string", "description": "Target ref (compare to)"}
                    }),
                    &["project_id", "ref_a", "ref_b"],
                ),
            ),
            Tool::AddMergeRequestComment => (
                "Add a comment (note) to a GitLab merge request.",
                schema(
                    serde_json::json!({
                        "project_id": id_prop("Project ID or path"),
                        "merge_request_iid": id_prop("Merge request IID"),
                        "body": {"type": "string", "description": "Comment text (Markdown)"}
                    }),
                    &["project_id", "merge_request_iid", "body"],
                ),
            ),
            Tool::ApproveMergeRequest => (
                "Approve a GitLab merge request.",
                schema(
                    serde_json::json!({
                        "project_id": id_prop("Project ID or path"),
                        "merge_request_iid": id_prop("Merge request IID"),
                        "approvals_required": {
                            "type": ["integer", "string"],
                            "description": "Number of approvals required"
                        }
                    }),
                    &["project_id", "merge_request_iid"],
                ),
            ),
            Tool::UnapproveMergeRequest => (
                "Withdraw your approval from a GitLab merge request.",
                schema(
                    serde_json::json!({
                        "project_id": id_prop("Project ID or path"),
                        "merge_request_iid": id_prop("Merge request IID")
                    }),
                    &["project_id", "merge_request_iid"],
                ),
            ),
            Tool::ListMergeRequests => (
                "List merge requests of a GitLab project.",
                schema(
                    serde_json::json!({
                        "project_id": id_prop("Project ID or path"),
                        "state": {"type": "string", "enum": MR_STATES},
                        "per_page": {
                            "type": ["integer", "string"],
                            "description": "1..=100, default 20"
                        },
                        "page": {"type": ["integer", "string"]}
                    }),
                    &["project_id"],
                ),
            ),
            Tool::FetchChange => (
                "Fetch a Gerrit change with its files and per-file diffs. \
                 Uses the current patchset unless `patchset_number` is given.",
                schema(
                    serde_json::json!({
                        "change_id": id_prop("Gerrit change id or number"),
                        "patchset_number":
                            id_prop("Patchset number; defaults to the current patchset")
                    }),
                    &["change_id"],
                ),
            ),
            Tool::FetchPatchsetDiff => (
                "Fetch differences between two patchsets of a Gerrit change. \
                 Every changed file comes with its diff; `file_path` narrows to one file.",
                schema(
                    serde_json::json!({
                        "change_id": id_prop("Gerrit change id or number"),
                        "base_patchset": id_prop("Patchset number to compare from"),
                        "target_patchset": id_prop("Patchset number to compare to"),
                        "file_path": {
                            "type": "string",
                            "description": "Only return this file, with its diff"
                        }
                    }),
                    &["change_id", "base_patchset", "target_patchset"],
                ),
            ),
            Tool::AddChangeComment => (
                "Post a review message on a Gerrit change.",
                schema(
                    serde_json::json!({
                        "change_id": id_prop("Gerrit change id or number"),
                        "message": {"type": "string"},
                        "patchset_number": id_prop("Patchset to comment on; defaults to current")
                    }),
                    &["change_id", "message"],
                ),
            ),
        };
        ToolDescriptor {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

pub const MR_STATES: [&str; 5] = ["opened", "closed", "locked", "merged", "all"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    Tool::ALL.iter().map(|t| t.descriptor()).collect()
}

fn id_prop(description: &str) -> Value {
    serde_json::json!({"type": ["string", "integer"], "description": description})
}

fn schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": required,
    })
}

/// Decode tool arguments into a typed input, mapping failures to `InvalidArgument`.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::invalid(e.to_string()))
}

/// Accepts a string or a number and yields its string form.
fn ident<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn opt_ident<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Accepts a non-negative integer given as a number or a numeric string.
fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("{} is not a non-negative integer", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("{:?} is not a non-negative integer", s))),
        Some(other) => Err(de::Error::custom(format!("expected integer, got {}", other))),
    }
}

// GitLab inputs

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchMergeRequestInput {
    #[serde(deserialize_with = "ident")]
    pub project_id: String,
    #[serde(deserialize_with = "ident")]
    pub merge_request_iid: String,
    #[serde(default, deserialize_with = "opt_ident")]
    pub revision: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchMergeRequestDiffInput {
    #[serde(deserialize_with = "ident")]
    pub project_id: String,
    #[serde(deserialize_with = "ident")]
    pub merge_request_iid: String,
    #[serde(default, deserialize_with = "opt_ident")]
    pub base: Option<String>,
    #[serde(default, deserialize_with = "opt_ident")]
    pub target: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareVersionsInput {
    #[serde(deserialize_with = "ident")]
    pub project_id: String,
    #[serde(deserialize_with = "ident")]
    pub ref_a: String,
    #[serde(deserialize_with = "ident")]
    pub ref_b: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMergeRequestCommentInput {
    #[serde(deserialize_with = "ident")]
    pub project_id: String,
    #[serde(deserialize_with = "ident")]
    pub merge_request_iid: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApproveMergeRequestInput {
    #[serde(deserialize_with = "ident")]
    pub project_id: String,
    #[serde(deserialize_with = "ident")]
    pub merge_request_iid: String,
    #[serde(default, deserialize_with = "opt_u32")]
    pub approvals_required: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeRequestRefInput {
    #[serde(deserialize_with = "ident")]
    pub project_id: String,
    #[serde(deserialize_with = "ident")]
    pub merge_request_iid: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListMergeRequestsInput {
    #[serde(deserialize_with = "ident")]
    pub project_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "opt_u32")]
    pub per_page: Option<u32>,
    #[serde(default, deserialize_with = "opt_u32")]
    pub page: Option<u32>,
}

// Gerrit inputs

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchChangeInput {
    #[serde(deserialize_with = "ident")]
    pub change_id: String,
    #[serde(default, deserialize_with = "opt_ident")]
    pub patchset_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchPatchsetDiffInput {
    #[serde(deserialize_with = "ident")]
    pub change_id: String,
    #[serde(deserialize_with = "ident")]
    pub base_patchset: String,
    #[serde(deserialize_with = "ident")]
    pub target_patchset: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddChangeCommentInput {
    #[serde(deserialize_with = "ident")]
    pub change_id: String,
    pub message: String,
    #[serde(default, deserialize_with = "opt_ident")]
    pub patchset_number: Option<String>,
}

/// Reject empty or whitespace-only identifiers.
pub fn require(name: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::invalid(format!("{} must not be empty", name)));
    }
    Ok(())
}
