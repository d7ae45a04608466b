//! # google-ads-gaql
//!
//! Library to run GAQL queries against the Google Ads REST API on behalf of a caller holding
//! an OAuth refresh token.
//!
//! Access tokens are cached per refresh token and refreshed on expiry. A query rejected with
//! a 401 is retried once with a freshly refreshed token. Responses from both `:search` and
//! `:searchStream` are flattened into plain JSON rows.
//!
//! You can read more information about GAQL here:
//! [https://developers.google.com/google-ads/api/docs/query/overview](https://developers.google.com/google-ads/api/docs/query/overview)
//!
//! ### Example
//!
//! ```no_run
//! use google_ads_gaql::{queries, Client, Config, QueryRequest};
//!
//! # async fn run() -> Result<(), google_ads_gaql::ClientError> {
//! let config = Config::new(
//!     String::from("YOUR_CLIENT_ID"),
//!     String::from("YOUR_CLIENT_SECRET"),
//!     String::from("YOUR_DEVELOPER_TOKEN"),
//! );
//! let client = Client::new(config)?;
//!
//! let refresh_token = "YOUR_REFRESH_TOKEN";
//! let access_token = client.get_access_token(Some(refresh_token)).await?;
//!
//! let request = QueryRequest::new("123-456-7890", access_token, queries::list_campaigns())
//!     .refresh_token(refresh_token);
//!
//! for row in client.execute(&request).await? {
//!     println!("{}", row["campaign"]["name"]);
//! }
//! # Ok(())
//! # }
//! ```

mod client_error;
mod client;
mod config;
pub mod queries;
pub mod response;
mod token_cache;
mod token_record;

pub use client::{mask_token, normalize_customer_id, Client, QueryRequest};
pub use client_error::ClientError;
pub use config::{Config, QueryEndpoint};
pub use response::ResultRow;
pub use token_cache::{CachedToken, TokenCache};
pub use token_record::TokenRecord;
