use crate::client_error::ClientError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Google's OAuth server.
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://oauth2.googleapis.com";

/// Google Ads REST API host.
pub const DEFAULT_ADS_BASE_URL: &str = "https://googleads.googleapis.com";

/// Google Ads REST API version queries are sent to.
pub const DEFAULT_API_VERSION: &str = "v17";

/// Which query method the client calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryEndpoint {
    /// `googleAds:search`, one page per call.
    Search,
    /// `googleAds:searchStream`, the whole result set in one response.
    SearchStream,
}

impl QueryEndpoint {
    /// Method suffix appended to the customer path.
    pub fn method(self) -> &'static str {
        match self {
            QueryEndpoint::Search => "googleAds:search",
            QueryEndpoint::SearchStream => "googleAds:searchStream",
        }
    }
}

impl Default for QueryEndpoint {
    fn default() -> QueryEndpoint {
        QueryEndpoint::SearchStream
    }
}

impl FromStr for QueryEndpoint {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<QueryEndpoint, ClientError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(QueryEndpoint::Search),
            "searchstream" | "search_stream" | "stream" => Ok(QueryEndpoint::SearchStream),
            other => Err(ClientError::Configuration(format!("unknown query endpoint `{}`", other))),
        }
    }
}

/// Credentials and endpoints used by a `Client`.
#[derive(Clone, Debug)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub developer_token: String,

    /// Used when `get_access_token()` is called without a refresh token.
    pub refresh_token: Option<String>,

    /// Manager account sent as `login-customer-id` when a request does not name one.
    pub login_customer_id: Option<String>,

    pub oauth_base_url: String,
    pub ads_base_url: String,
    pub api_version: String,
    pub endpoint: QueryEndpoint,

    /// Request timeout. `None` leaves timing out to whoever hosts the client.
    pub timeout: Option<Duration>,
}

impl Config {
    /// Create a config with the Google defaults for everything but the credentials.
    pub fn new(client_id: String, client_secret: String, developer_token: String) -> Config {
        Config {
            client_id,
            client_secret,
            developer_token,
            refresh_token: None,
            login_customer_id: None,
            oauth_base_url: String::from(DEFAULT_OAUTH_BASE_URL),
            ads_base_url: String::from(DEFAULT_ADS_BASE_URL),
            api_version: String::from(DEFAULT_API_VERSION),
            endpoint: QueryEndpoint::default(),
            timeout: None,
        }
    }

    /// Build a config from `GOOGLE_ADS_*` environment variables.
    pub fn from_env() -> Result<Config, ClientError> {
        let mut config = Config::new(
            required_var("GOOGLE_ADS_CLIENT_ID")?,
            required_var("GOOGLE_ADS_CLIENT_SECRET")?,
            required_var("GOOGLE_ADS_DEVELOPER_TOKEN")?,
        );

        config.refresh_token = optional_var("GOOGLE_ADS_REFRESH_TOKEN");
        config.login_customer_id = optional_var("GOOGLE_ADS_LOGIN_CUSTOMER_ID");

        if let Some(version) = optional_var("GOOGLE_ADS_API_VERSION") {
            config.api_version = version;
        }

        if let Some(endpoint) = optional_var("GOOGLE_ADS_QUERY_ENDPOINT") {
            config.endpoint = endpoint.parse()?;
        }

        Ok(config)
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Config {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_login_customer_id(mut self, login_customer_id: impl Into<String>) -> Config {
        self.login_customer_id = Some(login_customer_id.into());
        self
    }

    pub fn with_oauth_base_url(mut self, url: impl Into<String>) -> Config {
        self.oauth_base_url = url.into();
        self
    }

    pub fn with_ads_base_url(mut self, url: impl Into<String>) -> Config {
        self.ads_base_url = url.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Config {
        self.api_version = version.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: QueryEndpoint) -> Config {
        self.endpoint = endpoint;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Config {
        self.timeout = Some(timeout);
        self
    }

    /// OAuth token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/token", self.oauth_base_url.trim_end_matches('/'))
    }

    /// Query endpoint for an already normalized customer id.
    pub fn query_url(&self, customer_id: &str) -> String {
        format!(
            "{}/{}/customers/{}/{}",
            self.ads_base_url.trim_end_matches('/'),
            self.api_version,
            customer_id,
            self.endpoint.method()
        )
    }
}

fn required_var(name: &str) -> Result<String, ClientError> {
    optional_var(name).ok_or_else(|| ClientError::Configuration(format!("{} is not set", name)))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{Config, QueryEndpoint};

    fn get_config() -> Config {
        Config::new(String::from("id"), String::from("secret"), String::from("dev"))
    }

    #[test]
    fn defaults() {
        let config = get_config();

        assert_eq!(config.endpoint, QueryEndpoint::SearchStream);
        assert_eq!(config.refresh_token, None);
        assert_eq!(config.timeout, None);
        assert_eq!(config.token_url(), "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn stream_query_url() {
        let config = get_config();

        assert_eq!(
            config.query_url("1234567890"),
            "https://googleads.googleapis.com/v17/customers/1234567890/googleAds:searchStream"
        );
    }

    #[test]
    fn search_query_url_with_custom_base() {
        let config = get_config()
            .with_ads_base_url("http://127.0.0.1:1234/")
            .with_api_version("v16")
            .with_endpoint(QueryEndpoint::Search);

        assert_eq!(
            config.query_url("42"),
            "http://127.0.0.1:1234/v16/customers/42/googleAds:search"
        );
    }

    #[test]
    fn parse_endpoint() {
        assert_eq!("search".parse::<QueryEndpoint>().unwrap(), QueryEndpoint::Search);
        assert_eq!("searchStream".parse::<QueryEndpoint>().unwrap(), QueryEndpoint::SearchStream);
        assert!("mutate".parse::<QueryEndpoint>().is_err());
    }
}
