use crate::config::Config;
use crate::error::ToolError;
use crate::http::{build_client, RestClient};
use crate::tools::*;
use crate::{gerrit, gitlab, normalize};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Routes tool calls to the GitLab or Gerrit client.
///
/// Arguments are validated and requests built before any backend is
/// touched, so bad input never reaches the network.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    gitlab: Option<RestClient>,
    gerrit: Option<RestClient>,
    missing: Vec<String>,
}

fn to_value<T: Serialize>(entity: T) -> Result<Value, ToolError> {
    serde_json::to_value(entity).map_err(|e| ToolError::malformed(e.to_string()))
}

impl Dispatcher {
    pub fn from_config(cfg: &Config) -> Result<Self, ToolError> {
        let client = build_client(&cfg.user_agent, cfg.timeout_secs)?;
        Ok(Self {
            gitlab: cfg
                .gitlab
                .as_ref()
                .map(|g| RestClient::gitlab(client.clone(), g, cfg.max_retries)),
            gerrit: cfg
                .gerrit
                .as_ref()
                .map(|g| RestClient::gerrit(client.clone(), g, cfg.max_retries)),
            missing: cfg.missing.clone(),
        })
    }

    pub fn new(gitlab: Option<RestClient>, gerrit: Option<RestClient>) -> Self {
        let mut missing = Vec::new();
        if gitlab.is_none() {
            missing.push("GitLab tools need GITLAB_TOKEN".to_string());
        }
        if gerrit.is_none() {
            missing.push(
                "Gerrit tools need GERRIT_HOST, GERRIT_USER, GERRIT_HTTP_PASSWORD".to_string(),
            );
        }
        Self { gitlab, gerrit, missing }
    }

    fn not_configured(&self, prefix: &str) -> ToolError {
        let reason = self
            .missing
            .iter()
            .find(|m| m.starts_with(prefix))
            .cloned()
            .unwrap_or_else(|| format!("{} backend is not configured", prefix));
        ToolError::NotConfigured(reason)
    }

    fn gitlab(&self) -> Result<&RestClient, ToolError> {
        self.gitlab.as_ref().ok_or_else(|| self.not_configured("GitLab"))
    }

    fn gerrit(&self) -> Result<&RestClient, ToolError> {
        self.gerrit.as_ref().ok_or_else(|| self.not_configured("Gerrit"))
    }

    /// Run one tool call to completion. Each call is independent.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = Tool::from_name(name)?;
        let call_id = Uuid::new_v4();
        let backend = if tool.is_gerrit() { "gerrit" } else { "gitlab" };
        debug!("call {} tool={} backend={} args={}", call_id, tool.name(), backend, arguments);
        let result = self.run(tool, arguments).await;
        match &result {
            Ok(_) => debug!("call {} tool={} ok", call_id, tool.name()),
            Err(e) => warn!("call {} tool={} failed: {}", call_id, tool.name(), e),
        }
        result
    }

    async fn run(&self, tool: Tool, args: Value) -> Result<Value, ToolError> {
        match tool {
            Tool::FetchMergeRequest => {
                let input: FetchMergeRequestInput = parse_args(args)?;
                let req = gitlab::fetch_merge_request(&input)?;
                let raw = self.gitlab()?.execute(&req).await?;
                let payload = normalize::json_body(&raw)?;
                let summary = match input.revision {
                    Some(_) => normalize::merge_request_version_summary(
                        input.project_id.trim(),
                        input.merge_request_iid.trim(),
                        &payload,
                    )?,
                    None => normalize::merge_request_summary(&payload)?,
                };
                to_value(summary)
            }
            Tool::FetchMergeRequestDiff => {
                let input: FetchMergeRequestDiffInput = parse_args(args)?;
                let req = gitlab::fetch_merge_request_diff(&input)?;
                let client = self.gitlab()?;
                let raw = client.execute(&req).await?;
                let payload = normalize::json_body(&raw)?;
                if !gitlab::needs_version_resolution(&input) {
                    let file_path = input.file_path.as_deref();
                    return to_value(normalize::merge_request_diff(&payload, file_path)?);
                }
                let resolved = gitlab::resolve_versions(&input, &payload)?;
                let req = gitlab::compare_resolved_versions(&input.project_id, &resolved)?;
                let raw = client.execute(&req).await?;
                to_value(normalize::resolved_version_diff(
                    &resolved,
                    &normalize::json_body(&raw)?,
                    input.file_path.as_deref(),
                )?)
            }
            Tool::CompareVersions => {
                let input: CompareVersionsInput = parse_args(args)?;
                let req = gitlab::compare_versions(&input)?;
                let raw = self.gitlab()?.execute(&req).await?;
                to_value(normalize::version_comparison(
                    input.ref_a.trim(),
                    input.ref_b.trim(),
                    &normalize::json_body(&raw)?,
                )?)
            }
            Tool::AddMergeRequestComment => {
                let input: AddMergeRequestCommentInput = parse_args(args)?;
                let req = gitlab::add_comment(&input)?;
                let raw = self.gitlab()?.execute(&req).await?;
                to_value(normalize::merge_request_comment(
                    input.merge_request_iid.trim(),
                    &normalize::json_body(&raw)?,
                )?)
            }
            Tool::ApproveMergeRequest => {
                let input: ApproveMergeRequestInput = parse_args(args)?;
                let req = gitlab::approve(&input)?;
                let raw = self.gitlab()?.execute(&req).await?;
                to_value(normalize::approval(
                    input.merge_request_iid.trim(),
                    true,
                    &normalize::json_body(&raw)?,
                )?)
            }
            Tool::UnapproveMergeRequest => {
                let input: MergeRequestRefInput = parse_args(args)?;
                let req = gitlab::unapprove(&input)?;
                let raw = self.gitlab()?.execute(&req).await?;
                to_value(normalize::approval(
                    input.merge_request_iid.trim(),
                    false,
                    &normalize::json_body(&raw)?,
                )?)
            }
            Tool::ListMergeRequests => {
                let input: ListMergeRequestsInput = parse_args(args)?;
                let req = gitlab::list_merge_requests(&input)?;
                let raw = self.gitlab()?.execute(&req).await?;
                to_value(normalize::merge_request_list(
                    &normalize::json_body(&raw)?,
                    raw.next_page.as_deref(),
                )?)
            }
            Tool::FetchChange => {
                let input: FetchChangeInput = parse_args(args)?;
                let req = gerrit::change_detail(&input)?;
                let client = self.gerrit()?;
                let detail = normalize::gerrit_json_body(&client.execute(&req).await?)?;
                let revision = gerrit::resolve_revision(&detail, input.patchset_number.as_deref())?;
                let req = gerrit::revision_patch(&input.change_id, &revision)?;
                let patch = normalize::decode_patch(&client.execute(&req).await?)?;
                to_value(normalize::gerrit_change_summary(&detail, &revision, &patch)?)
            }
            Tool::FetchPatchsetDiff => {
                let input: FetchPatchsetDiffInput = parse_args(args)?;
                let req = gerrit::patchset_revisions(&input)?;
                let client = self.gerrit()?;
                let detail = normalize::gerrit_json_body(&client.execute(&req).await?)?;
                let (base, target) = gerrit::resolve_patchsets(&input, &detail)?;
                let req = gerrit::patchset_files(&input, &base, &target)?;
                let payload = normalize::gerrit_json_body(&client.execute(&req).await?)?;
                let file_path = input.file_path.as_deref().map(str::trim).filter(|p| !p.is_empty());
                if let Some(path) = file_path {
                    return to_value(normalize::gerrit_file_diff(&base, &target, path, &payload)?);
                }
                let mut diff = normalize::gerrit_patchset_files(&base, &target, &payload)?;
                // One DiffInfo call per listed file.
                for delta in &mut diff.files {
                    let req = gerrit::file_diff(&input.change_id, &base, &target, &delta.path)?;
                    let info = normalize::gerrit_json_body(&client.execute(&req).await?)?;
                    normalize::attach_file_diff(delta, &info)?;
                }
                to_value(diff)
            }
            Tool::AddChangeComment => {
                let input: AddChangeCommentInput = parse_args(args)?;
                let req = gerrit::add_review_message(&input)?;
                let raw = self.gerrit()?.execute(&req).await?;
                to_value(normalize::gerrit_review_posted(
                    input.change_id.trim(),
                    &normalize::gerrit_json_body(&raw)?,
                )?)
            }
        }
    }
}
