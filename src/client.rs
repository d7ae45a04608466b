use crate::client_error::ClientError;
use crate::config::Config;
use crate::response::{self, ApiErrorResponse, ResultRow};
use crate::token_cache::TokenCache;
use crate::token_record::TokenRecord;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Header carrying the Google Ads developer token.
const DEVELOPER_TOKEN_HEADER: &str = "developer-token";

/// Header carrying the manager (MCC) account a request acts through.
const LOGIN_CUSTOMER_ID_HEADER: &str = "login-customer-id";

/// Client for the Google Ads query endpoint, with an access token cache in front of the
/// OAuth refresh exchange.
pub struct Client {
    http: reqwest::Client,
    config: Config,
    tokens: Arc<TokenCache>,
}

impl Client {
    /// Create a new client with its own, empty token cache.
    pub fn new(config: Config) -> Result<Client, ClientError> {
        Client::with_cache(config, Arc::new(TokenCache::new()))
    }

    /// Create a new client that shares `tokens` with whoever else holds it.
    pub fn with_cache(config: Config, tokens: Arc<TokenCache>) -> Result<Client, ClientError> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Client {
            http: builder.build()?,
            config,
            tokens,
        })
    }
}

impl Client {
    /// Get the client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the token cache.
    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.tokens
    }
}

/// Get an abbreviated version of a credential, safe to write to logs.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();

    if chars.len() <= 12 {
        return String::from("****");
    }

    let prefix: String = chars[..6].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();

    format!("{}..{}", prefix, suffix)
}

/// Reduce a customer id to its digits, so `123-456-7890` becomes `1234567890`.
pub fn normalize_customer_id(customer_id: &str) -> String {
    customer_id.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    refresh_token: &'a str,
}

impl Client {
    /// Get an access token for `refresh_token`, or for the configured refresh token when
    /// `None` is passed. A live cached token is returned without touching the network.
    pub async fn get_access_token(&self, refresh_token: Option<&str>) -> Result<String, ClientError> {
        let refresh_token = match non_blank(refresh_token).or(non_blank(self.config.refresh_token.as_deref())) {
            Some(refresh_token) => refresh_token,
            None => {
                error!("no refresh token passed in or configured");
                return Err(ClientError::MissingCredential);
            }
        };

        if let Some(access_token) = self.tokens.get(refresh_token) {
            debug!(refresh_token = %mask_token(refresh_token), "using cached access token");
            return Ok(access_token);
        }

        let record = self.get_new_token(refresh_token).await?;

        record.access_token.ok_or_else(|| ClientError::TokenRefreshFailed {
            status: None,
            payload: String::from("no access token received"),
        })
    }

    /// Exchange `refresh_token` for a new access token and cache it. Guarantees an access
    /// token in the record when it returns an `Result::Ok`.
    pub async fn get_new_token(&self, refresh_token: &str) -> Result<TokenRecord, ClientError> {
        let form = serde_urlencoded::to_string(RefreshRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            grant_type: "refresh_token",
            refresh_token,
        })?;

        debug!(refresh_token = %mask_token(refresh_token), "refreshing access token");

        let response = self
            .http
            .post(self.config.token_url())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|err| {
                error!(error = %err, "token refresh request failed");
                ClientError::from(err)
            })?;

        let status = response.status();
        let raw_response = response.text().await?;

        if !status.is_success() {
            error!(
                status = status.as_u16(),
                refresh_token = %mask_token(refresh_token),
                payload = %raw_response,
                "token refresh rejected"
            );
            return Err(ClientError::TokenRefreshFailed {
                status: Some(status.as_u16()),
                payload: raw_response,
            });
        }

        let record = match serde_json::from_str::<TokenRecord>(&raw_response) {
            Ok(record) if record.access_token.as_deref().map_or(false, |token| !token.is_empty()) => record,
            _ => {
                error!(
                    status = status.as_u16(),
                    refresh_token = %mask_token(refresh_token),
                    payload = %raw_response,
                    "token refresh returned no access token"
                );
                return Err(ClientError::TokenRefreshFailed {
                    status: Some(status.as_u16()),
                    payload: raw_response,
                });
            }
        };

        if let Some(access_token) = &record.access_token {
            let entry = self.tokens.store(refresh_token, access_token.clone(), record.lifetime());

            info!(
                refresh_token = %mask_token(refresh_token),
                access_token = %mask_token(access_token),
                expires_at = %entry.expires_at,
                "refreshed access token"
            );
        }

        Ok(record)
    }

    /// Forget the cached access token for `refresh_token`. Returns whether one was cached.
    pub fn invalidate_token(&self, refresh_token: &str) -> bool {
        self.tokens.invalidate(refresh_token)
    }
}

/// One GAQL query and the credentials to run it with.
#[derive(Clone, Default)]
pub struct QueryRequest {
    pub customer_id: String,
    pub access_token: String,
    pub query: String,

    /// Manager account to act through. Falls back to the configured one.
    pub login_customer_id: Option<String>,

    /// When set, a rejected access token is refreshed through this and the query retried once.
    pub refresh_token: Option<String>,
}

impl QueryRequest {
    pub fn new(
        customer_id: impl Into<String>,
        access_token: impl Into<String>,
        query: impl Into<String>,
    ) -> QueryRequest {
        QueryRequest {
            customer_id: customer_id.into(),
            access_token: access_token.into(),
            query: query.into(),
            login_customer_id: None,
            refresh_token: None,
        }
    }

    pub fn login_customer_id(mut self, login_customer_id: impl Into<String>) -> QueryRequest {
        self.login_customer_id = Some(login_customer_id.into());
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> QueryRequest {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    fn validate(&self) -> Result<(), ClientError> {
        let missing = [
            ("customer id", &self.customer_id),
            ("access token", &self.access_token),
            ("query", &self.query),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(ClientError::InvalidArgument(format!("missing {}", missing.join(", "))));
        }

        Ok(())
    }
}

impl fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("customer_id", &self.customer_id)
            .field("access_token", &mask_token(&self.access_token))
            .field("query", &self.query)
            .field("login_customer_id", &self.login_customer_id)
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .finish()
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
}

/// Result of a single round trip to the query endpoint.
enum QueryOutcome {
    Success(String),
    Failed { status: StatusCode, payload: String },
}

impl Client {
    /// Run a GAQL query and return its rows in provider order.
    ///
    /// A 401 from the endpoint is retried exactly once, with a freshly refreshed token, when
    /// the request carries a refresh token. Any other failure, or a failure on the retry, is
    /// returned as `ClientError::QueryFailed`.
    pub async fn execute(&self, request: &QueryRequest) -> Result<Vec<ResultRow>, ClientError> {
        if let Err(err) = request.validate() {
            error!(error = %err, "rejecting query");
            return Err(err);
        }

        let customer_id = normalize_customer_id(&request.customer_id);
        if customer_id.is_empty() {
            error!(customer_id = %request.customer_id, "customer id has no digits");
            return Err(ClientError::InvalidArgument(format!(
                "customer id `{}` has no digits",
                request.customer_id
            )));
        }

        let login_customer_id = self.login_customer_id(request);
        let url = self.config.query_url(&customer_id);

        let first = self
            .send_query(&url, &request.access_token, &request.query, login_customer_id.as_deref())
            .await?;

        let body = match first {
            QueryOutcome::Success(body) => body,
            QueryOutcome::Failed { status, payload } => match non_blank(request.refresh_token.as_deref()) {
                Some(refresh_token) if status == StatusCode::UNAUTHORIZED => {
                    warn!(
                        customer_id = %customer_id,
                        refresh_token = %mask_token(refresh_token),
                        "access token rejected, refreshing and retrying once"
                    );

                    self.invalidate_token(refresh_token);
                    let access_token = self.get_access_token(Some(refresh_token)).await?;

                    match self
                        .send_query(&url, &access_token, &request.query, login_customer_id.as_deref())
                        .await?
                    {
                        QueryOutcome::Success(body) => body,
                        QueryOutcome::Failed { status, payload } => {
                            return Err(query_failed(&customer_id, status, payload, true));
                        }
                    }
                }
                _ => return Err(query_failed(&customer_id, status, payload, false)),
            },
        };

        let decoded = response::decode_body(&body).map_err(|err| {
            error!(customer_id = %customer_id, error = %err, "could not decode query response");
            err
        })?;

        if decoded.skipped_chunks > 0 {
            warn!(
                customer_id = %customer_id,
                skipped_chunks = decoded.skipped_chunks,
                "dropped unparseable chunks from query response"
            );
        }

        debug!(
            customer_id = %customer_id,
            rows = decoded.rows.len(),
            encoding = ?decoded.encoding,
            "query complete"
        );

        Ok(decoded.rows)
    }

    /// The manager account for a request: its own, else the configured default, digits only.
    fn login_customer_id(&self, request: &QueryRequest) -> Option<String> {
        non_blank(request.login_customer_id.as_deref())
            .or(non_blank(self.config.login_customer_id.as_deref()))
            .map(normalize_customer_id)
            .filter(|id| !id.is_empty())
    }

    async fn send_query(
        &self,
        url: &str,
        access_token: &str,
        query: &str,
        login_customer_id: Option<&str>,
    ) -> Result<QueryOutcome, ClientError> {
        let mut builder = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .header(DEVELOPER_TOKEN_HEADER, self.config.developer_token.as_str())
            .json(&SearchRequest { query });

        if let Some(login_customer_id) = login_customer_id {
            builder = builder.header(LOGIN_CUSTOMER_ID_HEADER, login_customer_id);
        }

        debug!(
            url = %url,
            access_token = %mask_token(access_token),
            login_customer_id = ?login_customer_id,
            "sending query"
        );

        let response = builder.send().await.map_err(|err| {
            error!(url = %url, error = %err, "query request failed");
            ClientError::from(err)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(QueryOutcome::Success(body))
        } else {
            Ok(QueryOutcome::Failed { status, payload: body })
        }
    }
}

fn query_failed(customer_id: &str, status: StatusCode, payload: String, retried: bool) -> ClientError {
    let summary = ApiErrorResponse::from_payload(&payload)
        .map(|err| err.to_string())
        .unwrap_or_else(|| payload.clone());

    error!(
        customer_id = %customer_id,
        status = status.as_u16(),
        retried,
        error = %summary,
        "query failed"
    );

    ClientError::QueryFailed {
        status: status.as_u16(),
        payload,
    }
}
