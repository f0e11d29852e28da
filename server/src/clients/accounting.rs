use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ClientError;
use crate::db::models::AccountingConnection;
use crate::schema::DateRange;

// A donation record as reported by the accounting provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedDonation {
    pub source_ref: String,
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub donated_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountingClient: Send + Sync {
    async fn fetch_donations(
        &self,
        connection: &AccountingConnection,
        range: &DateRange,
    ) -> Result<Vec<ImportedDonation>, ClientError>;
}

#[derive(Debug, Clone, Deserialize)]
struct DonationFeed {
    donations: Vec<ImportedDonation>,
}

pub struct HttpAccountingClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccountingClient {
    pub fn new(base_url: String) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl AccountingClient for HttpAccountingClient {
    async fn fetch_donations(
        &self,
        connection: &AccountingConnection,
        range: &DateRange,
    ) -> Result<Vec<ImportedDonation>, ClientError> {
        let url = format!(
            "{}/companies/{}/donations",
            self.base_url.trim_end_matches('/'),
            connection.realm_id
        );

        let response = self
            .http
            .get(url)
            .bearer_auth(&connection.access_token)
            .query(&[
                ("start", range.start_date.to_string()),
                ("end", range.end_date.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let feed: DonationFeed = response.json().await?;

        log::debug!(
            "Fetched {} donations from accounting realm {}",
            feed.donations.len(),
            connection.realm_id
        );

        Ok(feed.donations)
    }
}
