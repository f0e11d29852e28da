use actix_web::{get, http::StatusCode, post, web, HttpRequest, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db::models::SubscriptionStatus,
    db::MongoDbContext,
    error::{ApiError, Result},
    schema::{self, Field, Kind},
    session::SessionData,
    signing::verify_webhook_signature,
};

pub const SIGNATURE_HEADER: &str = "X-Billing-Signature";

// Shared secret for webhook signatures, registered as app data.
#[derive(Clone)]
pub struct WebhookSecret(pub Vec<u8>);

#[derive(Debug, Serialize)]
pub struct BillingStatusResponse {
    pub subscribed: bool,
    pub status: SubscriptionStatus,
}

#[get("/billing/status")]
pub async fn billing_status(
    db: web::Data<MongoDbContext>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let session = session.into_inner();

    let account = db
        .accounts()
        .find_by_id(&session.account_id)
        .await?
        .ok_or(ApiError::InvalidSession)?;

    Ok(HttpResponse::Ok().json(BillingStatusResponse {
        subscribed: account.is_subscribed(),
        status: account.subscription,
    }))
}

fn webhook_schema() -> Kind {
    Kind::object(vec![
        Field::new("accountId", Kind::String),
        Field::new("event", Kind::String),
    ])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    account_id: String,
    event: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
}

// The billing provider is a machine caller: authentication is an HMAC
// signature over the raw body, not a session.
#[post("/billing/webhook")]
pub async fn billing_webhook(
    req: HttpRequest,
    body: web::Bytes,
    db: web::Data<MongoDbContext>,
    secret: web::Data<WebhookSecret>,
) -> Result<HttpResponse> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !verify_webhook_signature(&secret.0, &body, signature) {
        log::warn!("Rejected billing webhook with bad signature");
        return Err(ApiError::Unauthorized);
    }

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::business(StatusCode::BAD_REQUEST, "Request body is not valid JSON"))?;
    let event: WebhookEvent = schema::parse(&webhook_schema(), &raw)?;

    let account_id = ObjectId::parse_str(&event.account_id)
        .map_err(|_| ApiError::business(StatusCode::BAD_REQUEST, "Unknown account id"))?;

    let status = match event.event.as_str() {
        "subscription.activated" => SubscriptionStatus::Active,
        "subscription.canceled" => SubscriptionStatus::Canceled,
        other => {
            return Err(ApiError::business(
                StatusCode::BAD_REQUEST,
                format!("Unknown event type: {other}"),
            ));
        }
    };

    let account = db
        .accounts()
        .find_by_id(&account_id)
        .await?
        .ok_or_else(|| ApiError::business(StatusCode::BAD_REQUEST, "Unknown account id"))?;

    db.accounts().set_subscription(&account_id, status).await?;

    log::info!(
        "Billing webhook: account {} -> {:?} ({})",
        account_id.to_hex(),
        status,
        account.email
    );

    Ok(HttpResponse::Ok().json(WebhookResponse { success: true }))
}
