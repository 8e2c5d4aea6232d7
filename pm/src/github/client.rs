//! GitHub REST and GraphQL client

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::error::GitHubError;
use super::types::{
    Commit, CreateIssueParams, Issue, IssueQuery, ProjectItem, ProjectSnapshot, PullRequest, PullRequestParams,
    RawCommit, RawIssue, RawRuns, RawSearch, RepositoryStats, UpdateIssueParams, WorkflowRun,
};
use crate::config::GitHubConfig;

const USER_AGENT: &str = concat!("pmagent/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const MAX_PER_PAGE: usize = 100;

const PROJECT_ITEMS_QUERY: &str = r#"
query($projectId: ID!) {
  node(id: $projectId) {
    ... on ProjectV2 {
      title
      items(first: 100) {
        nodes {
          id
          type
          content {
            ... on Issue { number title state }
            ... on PullRequest { number title state isDraft }
            ... on DraftIssue { title }
          }
          fieldValues(first: 20) {
            nodes {
              ... on ProjectV2ItemFieldSingleSelectValue {
                name
                field { ... on ProjectV2FieldCommon { name } }
              }
              ... on ProjectV2ItemFieldTextValue {
                text
                field { ... on ProjectV2FieldCommon { name } }
              }
            }
          }
        }
      }
    }
  }
}"#;

const STATUS_FIELD_QUERY: &str = r#"
query($projectId: ID!) {
  node(id: $projectId) {
    ... on ProjectV2 {
      field(name: "Status") {
        ... on ProjectV2SingleSelectField { id options { id name } }
      }
    }
  }
}"#;

const UPDATE_STATUS_MUTATION: &str = r#"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $optionId: String!) {
  updateProjectV2ItemFieldValue(input: {
    projectId: $projectId, itemId: $itemId, fieldId: $fieldId,
    value: { singleSelectOptionId: $optionId }
  }) {
    projectV2Item { id }
  }
}"#;

/// Client scoped to one repository
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: String,
    owner: String,
    repo: String,
    project_id: Option<String>,
}

impl GitHubClient {
    /// Create a client, reading the token from the environment variable named in config
    pub fn from_config(config: &GitHubConfig) -> Result<Self, GitHubError> {
        debug!(owner = %config.owner, repo = %config.repo, "from_config: called");
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GitHubError::NotConfigured(format!("set the {} environment variable", config.token_env)))?;
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(GitHubError::NotConfigured("set GITHUB_OWNER and GITHUB_REPO".to_string()));
        }

        let client = Self::new(&config.api_url, token, &config.owner, &config.repo)?;
        Ok(match &config.project_id {
            Some(id) => client.with_project(id),
            None => client,
        })
    }

    pub fn new(
        api_url: &str,
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Result<Self, GitHubError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            project_id: None,
        })
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// `owner/repo`
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn repo_path(&self, suffix: &str) -> String {
        format!("/repos/{}/{}{}", self.owner, self.repo, suffix)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GitHubError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "send: API error");
            return Err(GitHubError::api(status.as_u16(), &body));
        }
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, GitHubError> {
        debug!(%path, "get: called");
        self.send(self.request(Method::GET, path).query(query)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, GitHubError> {
        debug!(%path, "post: called");
        self.send(self.request(Method::POST, path).json(body)).await
    }

    /// Run a GraphQL query and return its `data`
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, GitHubError> {
        debug!("graphql: called");
        let mut response: Value = self
            .post("/graphql", &json!({ "query": query, "variables": variables }))
            .await?;

        if let Some(errors) = response.get("errors").and_then(|e| e.as_array())
            && let Some(first) = errors.first()
        {
            let message = first
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown GraphQL error");
            return Err(GitHubError::GraphQl(message.to_string()));
        }
        Ok(response.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    fn require_project(&self) -> Result<&str, GitHubError> {
        self.project_id
            .as_deref()
            .ok_or_else(|| GitHubError::NotConfigured("GitHub Project ID not set (GITHUB_PROJECT_ID)".to_string()))
    }

    /// Create an issue with priority and type labels
    pub async fn create_issue(&self, params: &CreateIssueParams) -> Result<Issue, GitHubError> {
        debug!(title = %params.title, "create_issue: called");
        let mut body = json!({
            "title": params.title,
            "body": params.body,
            "labels": params.all_labels(),
            "assignees": params.assignees,
        });
        if let Some(milestone) = params.milestone {
            body["milestone"] = json!(milestone);
        }
        let raw: RawIssue = self.post(&self.repo_path("/issues"), &body).await?;
        Ok(raw.into())
    }

    pub async fn update_issue(&self, number: u64, params: &UpdateIssueParams) -> Result<Issue, GitHubError> {
        debug!(number, "update_issue: called");
        let raw: RawIssue = self
            .send(
                self.request(Method::PATCH, &self.repo_path(&format!("/issues/{}", number)))
                    .json(params),
            )
            .await?;
        Ok(raw.into())
    }

    pub async fn close_issue(&self, number: u64) -> Result<Issue, GitHubError> {
        let params = UpdateIssueParams {
            state: Some("closed".to_string()),
            ..Default::default()
        };
        self.update_issue(number, &params).await
    }

    pub async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, GitHubError> {
        debug!(?query, "list_issues: called");
        let mut params = vec![
            ("state", query.state.to_string()),
            ("per_page", query.limit.clamp(1, MAX_PER_PAGE).to_string()),
        ];
        if !query.labels.is_empty() {
            params.push(("labels", query.labels.join(",")));
        }
        if let Some(assignee) = &query.assignee {
            params.push(("assignee", assignee.clone()));
        }

        let raw: Vec<RawIssue> = self.get(&self.repo_path("/issues"), &params).await?;
        Ok(raw.into_iter().take(query.limit).map(Issue::from).collect())
    }

    /// Search issues and pull requests in this repository
    pub async fn search_issues(&self, query: &str, limit: usize) -> Result<Vec<Issue>, GitHubError> {
        debug!(%query, limit, "search_issues: called");
        let q = format!("{} repo:{}", query, self.repository());
        let params = [("q", q), ("per_page", limit.clamp(1, MAX_PER_PAGE).to_string())];
        let raw: RawSearch = self.get("/search/issues", &params).await?;
        Ok(raw.items.into_iter().take(limit).map(Issue::from).collect())
    }

    pub async fn create_pull_request(&self, params: &PullRequestParams) -> Result<PullRequest, GitHubError> {
        debug!(head = %params.head, base = %params.base, "create_pull_request: called");
        self.post(&self.repo_path("/pulls"), params).await
    }

    pub async fn recent_commits(&self, limit: usize) -> Result<Vec<Commit>, GitHubError> {
        debug!(limit, "recent_commits: called");
        let params = [("per_page", limit.clamp(1, MAX_PER_PAGE).to_string())];
        let raw: Vec<RawCommit> = self.get(&self.repo_path("/commits"), &params).await?;
        Ok(raw.into_iter().take(limit).map(Commit::from).collect())
    }

    /// Repository metadata plus the 10 most recent commits
    pub async fn repository_stats(&self) -> Result<RepositoryStats, GitHubError> {
        debug!("repository_stats: called");
        let mut stats: RepositoryStats = self.get(&self.repo_path(""), &[]).await?;
        stats.recent_commits = self.recent_commits(10).await?;
        Ok(stats)
    }

    /// Recent Actions runs, optionally for one workflow file
    pub async fn workflow_runs(&self, workflow_file: Option<&str>, limit: usize) -> Result<Vec<WorkflowRun>, GitHubError> {
        debug!(?workflow_file, limit, "workflow_runs: called");
        let path = match workflow_file {
            Some(file) => self.repo_path(&format!("/actions/workflows/{}/runs", workflow_id(file))),
            None => self.repo_path("/actions/runs"),
        };
        let params = [("per_page", limit.clamp(1, MAX_PER_PAGE).to_string())];
        let raw: RawRuns = self.get(&path, &params).await?;
        Ok(raw
            .workflow_runs
            .into_iter()
            .take(limit)
            .map(WorkflowRun::from)
            .collect())
    }

    /// Dispatch a workflow run
    pub async fn trigger_workflow(
        &self,
        workflow_file: &str,
        git_ref: &str,
        inputs: serde_json::Map<String, Value>,
    ) -> Result<(), GitHubError> {
        debug!(%workflow_file, %git_ref, "trigger_workflow: called");
        let path = self.repo_path(&format!("/actions/workflows/{}/dispatches", workflow_id(workflow_file)));
        let response = self
            .request(Method::POST, &path)
            .json(&json!({ "ref": git_ref, "inputs": inputs }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(GitHubError::api(status.as_u16(), &body))
        }
    }

    /// Items on the configured Projects v2 board
    pub async fn project_items(&self) -> Result<ProjectSnapshot, GitHubError> {
        let project_id = self.require_project()?;
        debug!(%project_id, "project_items: called");
        let data = self
            .graphql(PROJECT_ITEMS_QUERY, json!({ "projectId": project_id }))
            .await?;
        parse_project(&data)
    }

    /// Move a board item to the named status column
    pub async fn update_project_item_status(&self, item_id: &str, status: &str) -> Result<(), GitHubError> {
        let project_id = self.require_project()?;
        debug!(%project_id, %item_id, %status, "update_project_item_status: called");

        let data = self
            .graphql(STATUS_FIELD_QUERY, json!({ "projectId": project_id }))
            .await?;
        let field = &data["node"]["field"];
        let field_id = field["id"]
            .as_str()
            .ok_or_else(|| GitHubError::NotFound("Status field on project".to_string()))?;

        let options = field["options"].as_array().cloned().unwrap_or_default();
        let option_id = options
            .iter()
            .find(|o| o["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(status)))
            .and_then(|o| o["id"].as_str())
            .ok_or_else(|| {
                let names: Vec<&str> = options.iter().filter_map(|o| o["name"].as_str()).collect();
                GitHubError::NotFound(format!("status '{}' (available: {})", status, names.join(", ")))
            })?;

        self.graphql(
            UPDATE_STATUS_MUTATION,
            json!({
                "projectId": project_id,
                "itemId": item_id,
                "fieldId": field_id,
                "optionId": option_id,
            }),
        )
        .await?;
        Ok(())
    }

    /// Authenticated read of the repository, used by `pm test`
    pub async fn check_connection(&self) -> Result<String, GitHubError> {
        debug!("check_connection: called");
        let repo: Value = self.get(&self.repo_path(""), &[]).await?;
        Ok(repo["full_name"].as_str().unwrap_or_default().to_string())
    }
}

/// Workflow id accepted by the API: the file name without its directory
fn workflow_id(file: &str) -> &str {
    file.rsplit('/').next().unwrap_or(file)
}

fn parse_project(data: &Value) -> Result<ProjectSnapshot, GitHubError> {
    let node = &data["node"];
    if node.is_null() {
        return Err(GitHubError::NotFound("GitHub Project".to_string()));
    }

    let mut items = Vec::new();
    for item in node["items"]["nodes"].as_array().into_iter().flatten() {
        let content = &item["content"];
        if content.is_null() {
            continue;
        }

        let mut fields = BTreeMap::new();
        for value in item["fieldValues"]["nodes"].as_array().into_iter().flatten() {
            let Some(field_name) = value["field"]["name"].as_str() else {
                continue;
            };
            if let Some(name) = value["name"].as_str() {
                fields.insert(field_name.to_string(), name.to_string());
            } else if let Some(text) = value["text"].as_str() {
                fields.insert(field_name.to_string(), text.to_string());
            }
        }

        items.push(ProjectItem {
            id: item["id"].as_str().unwrap_or_default().to_string(),
            item_type: item["type"].as_str().unwrap_or("unknown").to_lowercase(),
            number: content["number"].as_u64(),
            title: content["title"].as_str().unwrap_or_default().to_string(),
            state: content["state"].as_str().map(String::from),
            is_draft: content["isDraft"].as_bool().unwrap_or(false),
            fields,
        });
    }

    Ok(ProjectSnapshot {
        title: node["title"].as_str().unwrap_or_default().to_string(),
        items,
    })
}
