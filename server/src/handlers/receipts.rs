use std::collections::BTreeMap;

use actix_web::{get, http::StatusCode, post, web, HttpResponse};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    clients::{ReceiptEmail, ReceiptMailer},
    config::AppConfig,
    db::models::{format_receipt_number, Donation, Receipt},
    db::MongoDbContext,
    error::{ApiError, Result},
    schema::{self, date_range_kind, DateRange, Field, Kind},
    session::SessionData,
};

fn generate_schema() -> Kind {
    Kind::object(vec![
        Field::new("items", Kind::array(Kind::Int)),
        Field::new("dateRange", date_range_kind()),
    ])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReceiptsRequest {
    items: Vec<i64>,
    date_range: DateRange,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptInfo {
    pub receipt_number: String,
    pub donor_name: String,
    pub donor_email: String,
    pub donation_numbers: Vec<i64>,
    pub total_cents: i64,
    pub currency: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub email_sent: bool,
}

impl From<&Receipt> for ReceiptInfo {
    fn from(receipt: &Receipt) -> Self {
        Self {
            receipt_number: receipt.receipt_number.clone(),
            donor_name: receipt.donor_name.clone(),
            donor_email: receipt.donor_email.clone(),
            donation_numbers: receipt.donation_numbers.clone(),
            total_cents: receipt.total_cents,
            currency: receipt.currency.clone(),
            period_start: receipt.period_start,
            period_end: receipt.period_end,
            email_sent: receipt.email_sent,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptListResponse {
    pub receipts: Vec<ReceiptInfo>,
}

#[get("/receipts")]
pub async fn list_receipts(
    db: web::Data<MongoDbContext>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let session = session.into_inner();

    let receipts = db.receipts().find_by_account(&session.account_id).await?;
    let receipts: Vec<ReceiptInfo> = receipts.iter().map(ReceiptInfo::from).collect();

    Ok(HttpResponse::Ok().json(ReceiptListResponse { receipts }))
}

#[derive(Debug, Serialize)]
pub struct GenerateReceiptsResponse {
    pub success: bool,
    pub receipts: Vec<ReceiptInfo>,
}

#[post("/receipts/generate")]
pub async fn generate_receipts(
    body: web::Json<Value>,
    db: web::Data<MongoDbContext>,
    config: web::Data<AppConfig>,
    mailer: web::Data<dyn ReceiptMailer>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let input: GenerateReceiptsRequest = schema::parse(&generate_schema(), &body)?;
    let session = session.into_inner();

    if !input.date_range.is_valid() {
        return Err(ApiError::business(
            StatusCode::BAD_REQUEST,
            "endDate must not be before startDate",
        ));
    }
    if input.items.is_empty() {
        return Err(ApiError::business(
            StatusCode::BAD_REQUEST,
            "No donations selected",
        ));
    }

    // Receipt generation is the paid feature
    let account = db
        .accounts()
        .find_by_id(&session.account_id)
        .await?
        .ok_or(ApiError::InvalidSession)?;
    if !account.is_subscribed() {
        return Err(ApiError::business(
            StatusCode::PAYMENT_REQUIRED,
            "User is not subscribed",
        ));
    }

    let donations = db
        .donations()
        .find_by_account_and_numbers(&session.account_id, &input.items)
        .await?;

    let in_range: Vec<Donation> = donations
        .into_iter()
        .filter(|d| input.date_range.contains(d.donated_at.date_naive()))
        .collect();

    if in_range.is_empty() {
        return Err(ApiError::business(
            StatusCode::BAD_REQUEST,
            "No matching donations in the selected period",
        ));
    }

    let drafts = group_by_donor(&in_range);
    let issued_at = Utc::now();
    let year = issued_at.year();

    let mut issued = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let sequence = db.counters().next(&session.account_id, "receipt").await?;
        let receipt_number =
            format_receipt_number(&config.organization.receipt_prefix, year, sequence);

        let email = ReceiptEmail {
            to: draft.donor_email.clone(),
            donor_name: draft.donor_name.clone(),
            organization: config.organization.name.clone(),
            receipt_number: receipt_number.clone(),
            total_cents: draft.total_cents,
            currency: draft.currency.clone(),
            period_start: input.date_range.start_date,
            period_end: input.date_range.end_date,
        };

        // A failed send is recorded, not fatal; the receipt itself stands.
        let email_sent = match mailer.send_receipt(&email).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    "Failed to email receipt {} to {}: {}",
                    receipt_number,
                    draft.donor_email,
                    err
                );
                false
            }
        };

        let receipt = Receipt {
            id: None,
            account_id: session.account_id,
            number: sequence,
            receipt_number,
            donor_name: draft.donor_name,
            donor_email: draft.donor_email,
            donation_numbers: draft.donation_numbers.clone(),
            total_cents: draft.total_cents,
            currency: draft.currency,
            period_start: input.date_range.start_date,
            period_end: input.date_range.end_date,
            issued_at,
            email_sent,
        };

        db.receipts().insert(&receipt).await?;
        db.donations()
            .mark_receipted(&session.account_id, &draft.donation_numbers)
            .await?;

        issued.push(ReceiptInfo::from(&receipt));
    }

    log::info!(
        "Issued {} receipts for account {}",
        issued.len(),
        session.account_id.to_hex()
    );

    Ok(HttpResponse::Ok().json(GenerateReceiptsResponse {
        success: true,
        receipts: issued,
    }))
}

#[derive(Debug, Clone, PartialEq)]
struct ReceiptDraft {
    donor_name: String,
    donor_email: String,
    donation_numbers: Vec<i64>,
    total_cents: i64,
    currency: String,
}

// One receipt per (donor email, currency), in deterministic order.
fn group_by_donor(donations: &[Donation]) -> Vec<ReceiptDraft> {
    let mut groups: BTreeMap<(String, String), ReceiptDraft> = BTreeMap::new();

    for donation in donations {
        let key = (donation.donor_email.clone(), donation.currency.clone());
        let draft = groups.entry(key).or_insert_with(|| ReceiptDraft {
            donor_name: donation.donor_name.clone(),
            donor_email: donation.donor_email.clone(),
            donation_numbers: Vec::new(),
            total_cents: 0,
            currency: donation.currency.clone(),
        });
        draft.donation_numbers.push(donation.number);
        draft.total_cents += donation.amount_cents;
    }

    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mongodb::bson::oid::ObjectId;

    fn donation(number: i64, email: &str, cents: i64) -> Donation {
        Donation::new(
            ObjectId::new(),
            number,
            "Dana Donor".to_string(),
            email.to_string(),
            cents,
            "USD".to_string(),
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_group_by_donor_sums_per_donor() {
        let donations = vec![
            donation(1, "a@example.com", 1000),
            donation(2, "b@example.com", 2500),
            donation(3, "a@example.com", 500),
        ];

        let drafts = group_by_donor(&donations);
        assert_eq!(drafts.len(), 2);

        assert_eq!(drafts[0].donor_email, "a@example.com");
        assert_eq!(drafts[0].total_cents, 1500);
        assert_eq!(drafts[0].donation_numbers, vec![1, 3]);

        assert_eq!(drafts[1].donor_email, "b@example.com");
        assert_eq!(drafts[1].total_cents, 2500);
    }

    #[test]
    fn test_group_by_donor_splits_currencies() {
        let mut eur = donation(2, "a@example.com", 700);
        eur.currency = "EUR".to_string();
        let donations = vec![donation(1, "a@example.com", 1000), eur];

        let drafts = group_by_donor(&donations);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].currency, "EUR");
        assert_eq!(drafts[1].currency, "USD");
    }

    #[test]
    fn test_group_by_donor_empty() {
        assert!(group_by_donor(&[]).is_empty());
    }
}
