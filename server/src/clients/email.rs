use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::ClientError;

#[derive(Debug, Clone)]
pub struct ReceiptEmail {
    pub to: String,
    pub donor_name: String,
    pub organization: String,
    pub receipt_number: String,
    pub total_cents: i64,
    pub currency: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[async_trait]
pub trait ReceiptMailer: Send + Sync {
    async fn send_receipt(&self, email: &ReceiptEmail) -> Result<(), ClientError>;
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: String,
}

pub struct HttpMailer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    from_address: String,
}

impl HttpMailer {
    pub fn new(
        base_url: String,
        api_key: String,
        from_address: String,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key,
            from_address,
        })
    }
}

#[async_trait]
impl ReceiptMailer for HttpMailer {
    async fn send_receipt(&self, email: &ReceiptEmail) -> Result<(), ClientError> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));

        let message = OutboundMessage {
            from: &self.from_address,
            to: &email.to,
            subject: format!("Your donation receipt {}", email.receipt_number),
            text: render_text(email),
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        log::debug!("Sent receipt {} to {}", email.receipt_number, email.to);

        Ok(())
    }
}

// Plain-text body only; rich templating is the mail provider's concern.
fn render_text(email: &ReceiptEmail) -> String {
    format!(
        "Dear {},\n\n{} thanks you for your donations between {} and {}.\n\
         This receipt ({}) covers a total of {}.\n",
        email.donor_name,
        email.organization,
        email.period_start,
        email.period_end,
        email.receipt_number,
        format_amount(email.total_cents, &email.currency),
    )
}

pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{}{}.{:02} {}", sign, cents / 100, cents % 100, currency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(123_45, "USD"), "123.45 USD");
        assert_eq!(format_amount(5, "USD"), "0.05 USD");
        assert_eq!(format_amount(-1000, "CAD"), "-10.00 CAD");
    }

    #[test]
    fn test_render_text_mentions_receipt_number_and_total() {
        let email = ReceiptEmail {
            to: "donor@example.com".to_string(),
            donor_name: "Dana Donor".to_string(),
            organization: "Example Charity".to_string(),
            receipt_number: "RCPT-2024-00001".to_string(),
            total_cents: 250_00,
            currency: "USD".to_string(),
            period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        };

        let text = render_text(&email);
        assert!(text.contains("RCPT-2024-00001"));
        assert!(text.contains("250.00 USD"));
        assert!(text.contains("Dana Donor"));
    }
}
