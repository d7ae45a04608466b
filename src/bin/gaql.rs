use anyhow::Context;
use clap::Parser;
use google_ads_gaql::queries::{self, DateRange};
use google_ads_gaql::{Client, Config, QueryRequest};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gaql", about = "Run a GAQL query against a Google Ads account")]
struct Args {
    /// Account to query, with or without dashes.
    #[arg(long)]
    customer_id: String,

    /// Manager account to act through. Defaults to GOOGLE_ADS_LOGIN_CUSTOMER_ID.
    #[arg(long)]
    login_customer_id: Option<String>,

    /// Refresh token. Defaults to GOOGLE_ADS_REFRESH_TOKEN.
    #[arg(long)]
    refresh_token: Option<String>,

    /// Raw GAQL query.
    #[arg(long, conflicts_with_all = ["campaigns", "performance", "accounts"])]
    query: Option<String>,

    /// List campaigns.
    #[arg(long)]
    campaigns: bool,

    /// Campaign metrics for the last 30 days.
    #[arg(long)]
    performance: bool,

    /// List accounts under the customer, which must be a manager.
    #[arg(long)]
    accounts: bool,
}

impl Args {
    fn gaql(&self) -> anyhow::Result<String> {
        if let Some(query) = &self.query {
            return Ok(query.clone());
        }

        if self.campaigns {
            Ok(queries::list_campaigns())
        } else if self.performance {
            Ok(queries::campaign_performance(DateRange::Last30Days))
        } else if self.accounts {
            Ok(queries::customer_clients())
        } else {
            anyhow::bail!("one of --query, --campaigns, --performance or --accounts is required")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let query = args.gaql()?;

    let config = Config::from_env().context("loading Google Ads configuration")?;
    let refresh_token = args.refresh_token.clone().or_else(|| config.refresh_token.clone());
    let client = Client::new(config)?;

    let access_token = client
        .get_access_token(refresh_token.as_deref())
        .await
        .context("acquiring access token")?;

    let mut request = QueryRequest::new(args.customer_id.as_str(), access_token, query);
    if let Some(login_customer_id) = &args.login_customer_id {
        request = request.login_customer_id(login_customer_id.as_str());
    }
    if let Some(refresh_token) = refresh_token {
        request = request.refresh_token(refresh_token);
    }

    let rows = client.execute(&request).await.context("running query")?;
    tracing::info!(rows = rows.len(), "query returned");

    println!("{}", serde_json::to_string_pretty(&rows)?);

    Ok(())
}
