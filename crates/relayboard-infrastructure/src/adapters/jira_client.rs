//! HTTP client for refreshing cached Jira issue statuses (spec §4.1 table
//! "Jira-refresh").

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::JiraClient;

/// `reqwest`-backed [`JiraClient`] against the Jira Cloud REST API.
pub struct ReqwestJiraClient {
    client: Client,
    base_url: String,
    user_email: String,
    api_token: String,
}

impl ReqwestJiraClient {
    /// Construct a client against `base_url` (e.g. `https://company.atlassian.net`),
    /// authenticating with HTTP basic auth per Jira Cloud convention.
    #[must_use]
    pub fn new(base_url: String, user_email: String, api_token: String) -> Self {
        Self { client: Client::new(), base_url, user_email, api_token }
    }
}

#[derive(Deserialize)]
struct IssueResponse {
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    status: IssueStatus,
}

#[derive(Deserialize)]
struct IssueStatus {
    name: String,
}

#[async_trait]
impl JiraClient for ReqwestJiraClient {
    async fn fetch_status(&self, issue_key: &str) -> Result<String> {
        let url = format!("{}/rest/api/3/issue/{issue_key}?fields=status", self.base_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user_email, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| Error::network(format!("jira request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("jira issue {issue_key}")));
        }
        if !response.status().is_success() {
            return Err(Error::network(format!("jira request for {issue_key} returned {}", response.status())));
        }

        let body: IssueResponse =
            response.json().await.map_err(|e| Error::network(format!("malformed jira response: {e}")))?;
        Ok(body.fields.status.name)
    }
}
