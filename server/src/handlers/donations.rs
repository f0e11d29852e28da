use actix_web::{get, http::StatusCode, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    clients::AccountingClient,
    db::models::Donation,
    db::MongoDbContext,
    error::{ApiError, Result},
    schema::{self, date_range_kind, DateRange, Field, Kind},
    session::SessionData,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationInfo {
    pub number: i64,
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub donated_at: DateTime<Utc>,
    pub receipted: bool,
}

impl From<&Donation> for DonationInfo {
    fn from(donation: &Donation) -> Self {
        Self {
            number: donation.number,
            donor_name: donation.donor_name.clone(),
            donor_email: donation.donor_email.clone(),
            amount_cents: donation.amount_cents,
            currency: donation.currency.clone(),
            donated_at: donation.donated_at,
            receipted: donation.receipted,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DonationListResponse {
    pub donations: Vec<DonationInfo>,
}

#[get("/donations")]
pub async fn list_donations(
    db: web::Data<MongoDbContext>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let session = session.into_inner();

    let donations = db.donations().find_by_account(&session.account_id).await?;
    let donations: Vec<DonationInfo> = donations.iter().map(DonationInfo::from).collect();

    Ok(HttpResponse::Ok().json(DonationListResponse { donations }))
}

fn import_schema() -> Kind {
    Kind::object(vec![Field::new("dateRange", date_range_kind())])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportDonationsRequest {
    date_range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct ImportDonationsResponse {
    pub success: bool,
    pub imported: usize,
    pub skipped: usize,
}

#[post("/donations/import")]
pub async fn import_donations(
    body: web::Json<Value>,
    db: web::Data<MongoDbContext>,
    accounting: web::Data<dyn AccountingClient>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let input: ImportDonationsRequest = schema::parse(&import_schema(), &body)?;
    let session = session.into_inner();

    if !input.date_range.is_valid() {
        return Err(ApiError::business(
            StatusCode::BAD_REQUEST,
            "endDate must not be before startDate",
        ));
    }

    // The guard middleware has already checked the permission flag; the
    // connection itself lives on the account document.
    let account = db
        .accounts()
        .find_by_id(&session.account_id)
        .await?
        .ok_or(ApiError::InvalidSession)?;
    let connection = account.accounting.ok_or(ApiError::AccountingNotConnected)?;

    let fetched = accounting
        .fetch_donations(&connection, &input.date_range)
        .await?;

    let mut imported = 0;
    let mut skipped = 0;
    for entry in fetched {
        if db
            .donations()
            .source_ref_exists(&session.account_id, &entry.source_ref)
            .await?
        {
            skipped += 1;
            continue;
        }

        let number = db.counters().next(&session.account_id, "donation").await?;
        let mut donation = Donation::new(
            session.account_id,
            number,
            entry.donor_name,
            entry.donor_email,
            entry.amount_cents,
            entry.currency,
            entry.donated_at,
        );
        donation.source_ref = Some(entry.source_ref);

        db.donations().insert(&donation).await?;
        imported += 1;
    }

    log::info!(
        "Imported {} donations ({} already present) for account {}",
        imported,
        skipped,
        session.account_id.to_hex()
    );

    Ok(HttpResponse::Ok().json(ImportDonationsResponse {
        success: true,
        imported,
        skipped,
    }))
}
