//! HTTP client for reading directory-group membership (spec §4.1 table
//! "Directory-group sync"), speaking a generic SCIM-like group-members API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::DirectoryClient;

/// `reqwest`-backed [`DirectoryClient`] against a SCIM-style directory API.
pub struct ReqwestDirectoryClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl ReqwestDirectoryClient {
    /// Construct a client against `base_url`, authenticating with a bearer token.
    #[must_use]
    pub fn new(base_url: String, api_token: String) -> Self {
        Self { client: Client::new(), base_url, api_token }
    }
}

#[derive(Deserialize)]
struct GroupMembersResponse {
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct Member {
    id: String,
}

#[async_trait]
impl DirectoryClient for ReqwestDirectoryClient {
    async fn list_group_members(&self, group_id: &str) -> Result<Vec<String>> {
        let url = format!("{}/Groups/{group_id}/members", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::network(format!("directory request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("directory group {group_id}")));
        }
        if !response.status().is_success() {
            return Err(Error::network(format!("directory request for {group_id} returned {}", response.status())));
        }

        let body: GroupMembersResponse =
            response.json().await.map_err(|e| Error::network(format!("malformed directory response: {e}")))?;
        Ok(body.members.into_iter().map(|m| m.id).collect())
    }
}
