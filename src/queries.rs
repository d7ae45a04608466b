//! GAQL queries behind the common account views.

use crate::client_error::ClientError;
use std::fmt;

/// Predefined date ranges accepted by GAQL's `DURING` operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateRange {
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
}

impl DateRange {
    pub fn as_gaql(self) -> &'static str {
        match self {
            DateRange::Last7Days => "LAST_7_DAYS",
            DateRange::Last30Days => "LAST_30_DAYS",
            DateRange::ThisMonth => "THIS_MONTH",
            DateRange::LastMonth => "LAST_MONTH",
        }
    }
}

impl Default for DateRange {
    fn default() -> DateRange {
        DateRange::Last30Days
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_gaql())
    }
}

/// Every non-removed campaign with its status, channel and budget.
pub fn list_campaigns() -> String {
    String::from(
        "SELECT campaign.id, campaign.name, campaign.status, \
         campaign.advertising_channel_type, campaign_budget.amount_micros \
         FROM campaign \
         WHERE campaign.status != 'REMOVED' \
         ORDER BY campaign.name",
    )
}

/// Per-campaign delivery metrics over `range`.
pub fn campaign_performance(range: DateRange) -> String {
    format!(
        "SELECT campaign.id, campaign.name, campaign.status, \
         metrics.impressions, metrics.clicks, metrics.ctr, metrics.average_cpc, \
         metrics.cost_micros, metrics.conversions \
         FROM campaign \
         WHERE segments.date DURING {} AND campaign.status != 'REMOVED' \
         ORDER BY metrics.cost_micros DESC",
        range
    )
}

/// Reduce a resource id to its digits. An id with no digits at all is rejected.
fn numeric_id(kind: &str, id: &str) -> Result<String, ClientError> {
    let digits: String = id.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{} `{}` has no digits", kind, id)));
    }

    Ok(digits)
}

/// Ad groups of one campaign.
pub fn ad_groups(campaign_id: &str) -> Result<String, ClientError> {
    Ok(format!(
        "SELECT ad_group.id, ad_group.name, ad_group.status, ad_group.cpc_bid_micros, campaign.id \
         FROM ad_group \
         WHERE campaign.id = {} AND ad_group.status != 'REMOVED' \
         ORDER BY ad_group.name",
        numeric_id("campaign id", campaign_id)?
    ))
}

/// Keywords of one ad group.
pub fn keywords(ad_group_id: &str) -> Result<String, ClientError> {
    Ok(format!(
        "SELECT ad_group_criterion.criterion_id, ad_group_criterion.keyword.text, \
         ad_group_criterion.keyword.match_type, ad_group_criterion.status, ad_group.id \
         FROM keyword_view \
         WHERE ad_group.id = {} AND ad_group_criterion.status != 'REMOVED'",
        numeric_id("ad group id", ad_group_id)?
    ))
}

/// Accounts directly under a manager account. Run it against the manager's customer id.
pub fn customer_clients() -> String {
    String::from(
        "SELECT customer_client.id, customer_client.descriptive_name, customer_client.manager, \
         customer_client.currency_code, customer_client.time_zone, customer_client.status \
         FROM customer_client \
         WHERE customer_client.level = 1",
    )
}
