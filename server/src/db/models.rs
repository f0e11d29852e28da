use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    #[default]
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingConnection {
    pub realm_id: String,
    pub access_token: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub subscription: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounting: Option<AccountingConnection>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

impl Account {
    pub fn new(email: String, name: String, password: &str) -> Result<Self> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

        Ok(Self {
            id: None,
            email,
            password_hash,
            name,
            image_url: None,
            subscription: SubscriptionStatus::Inactive,
            accounting: None,
            created_at: Utc::now(),
            last_login: Utc::now(),
        })
    }

    pub fn verify_password(&self, password: &str) -> Result<bool> {
        Ok(bcrypt::verify(password, &self.password_hash)?)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription == SubscriptionStatus::Active
    }

    pub fn has_accounting(&self) -> bool {
        self.accounting.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub account_id: ObjectId,
    // Per-account sequential number; the integer ids used in request bodies.
    pub number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub donated_at: DateTime<Utc>,
    pub receipted: bool,
    pub created_at: DateTime<Utc>,
}

impl Donation {
    pub fn new(
        account_id: ObjectId,
        number: i64,
        donor_name: String,
        donor_email: String,
        amount_cents: i64,
        currency: String,
        donated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            account_id,
            number,
            source_ref: None,
            donor_name,
            donor_email,
            amount_cents,
            currency,
            donated_at,
            receipted: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub account_id: ObjectId,
    pub number: i64,
    pub receipt_number: String,
    pub donor_name: String,
    pub donor_email: String,
    pub donation_numbers: Vec<i64>,
    pub total_cents: i64,
    pub currency: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub issued_at: DateTime<Utc>,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub account_id: ObjectId,
    pub kind: String,
    pub value: i64,
}

pub fn format_receipt_number(prefix: &str, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:05}", prefix, year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_new() {
        let account = Account::new(
            "org@example.com".to_string(),
            "Example Org".to_string(),
            "password123",
        )
        .unwrap();
        assert_eq!(account.email, "org@example.com");
        assert_ne!(account.password_hash, "password123");
        assert!(account.id.is_none());
        assert!(!account.is_subscribed());
        assert!(!account.has_accounting());
    }

    #[test]
    fn test_verify_password_correct() {
        let account = Account::new(
            "org@example.com".to_string(),
            "Example Org".to_string(),
            "password123",
        )
        .unwrap();
        assert!(account.verify_password("password123").unwrap());
    }

    #[test]
    fn test_verify_password_incorrect() {
        let account = Account::new(
            "org@example.com".to_string(),
            "Example Org".to_string(),
            "password123",
        )
        .unwrap();
        assert!(!account.verify_password("wrongpassword").unwrap());
    }

    #[test]
    fn test_subscription_status_serde_names() {
        let active = serde_json::to_string(&SubscriptionStatus::Active).unwrap();
        assert_eq!(active, "\"active\"");
        let parsed: SubscriptionStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(parsed, SubscriptionStatus::Canceled);
    }

    #[test]
    fn test_format_receipt_number() {
        assert_eq!(format_receipt_number("RCPT", 2024, 42), "RCPT-2024-00042");
    }
}
