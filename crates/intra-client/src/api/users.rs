//! Users API.

use crate::client::IntraClient;
use crate::error::{Error, Result};
use crate::types::User;

/// Query parameters for searching users.
#[derive(Debug, Default, serde::Serialize)]
pub struct SearchUsersQuery {
    /// Exact login to match.
    #[serde(rename = "filter[login]")]
    pub login: String,
    /// Maximum number of results per page.
    #[serde(rename = "page[size]", skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

/// Users API client.
pub struct UsersApi {
    client: IntraClient,
}

impl UsersApi {
    pub(crate) fn new(client: IntraClient) -> Self {
        Self { client }
    }

    /// Profile of the authenticated user.
    pub async fn me(&self) -> Result<User> {
        self.client.get("me").await
    }

    /// Profile of a user by login.
    pub async fn get(&self, login: &str) -> Result<User> {
        let login = login.trim();
        if login.is_empty() {
            return Err(Error::NotFound("empty login".to_string()));
        }
        self.client
            .get(&format!("users/{}", urlencoding::encode(login)))
            .await
    }

    /// Users whose login matches `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<User>> {
        self.search_with_query(SearchUsersQuery {
            login: query.trim().to_string(),
            ..Default::default()
        })
        .await
    }

    /// Search with explicit query parameters.
    pub async fn search_with_query(&self, query: SearchUsersQuery) -> Result<Vec<User>> {
        if query.login.is_empty() {
            return Ok(Vec::new());
        }
        self.client.get_with_query("users", &query).await
    }
}
