//! HTTP client for the 42 intranet `/v2` API.
//!
//! Every request asks an [`intra_auth::AccessTokenSource`] for a currently
//! valid token, so token refresh stays out of the request layer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use intra_client::{IntraClient, Result};
//!
//! # async fn example(tokens: Arc<dyn intra_auth::AccessTokenSource>) -> Result<()> {
//! let client = IntraClient::builder()
//!     .base_url("https://api.intra.42.fr")
//!     .token_source(tokens)
//!     .build()?;
//!
//! let me = client.users().me().await?;
//! if let Some(cursus) = me.primary_cursus() {
//!     let (level, percent) = cursus.level_progress();
//!     println!("{} is level {} ({}%)", me.login, level, percent);
//! }
//!
//! for user in client.users().search("jdoe").await? {
//!     println!("{}", user.login);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Users**: own profile, profile by login, search by login

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use api::SearchUsersQuery;
pub use client::{ClientBuilder, DEFAULT_BASE_URL, IntraClient};
pub use error::{Error, Result};
pub use types::*;
