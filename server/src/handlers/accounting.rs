use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db::models::AccountingConnection,
    db::MongoDbContext,
    error::Result,
    schema::{self, Field, Kind},
    session::{SessionData, SessionManager},
};

#[derive(Debug, Serialize)]
pub struct AccountingStatusResponse {
    pub connected: bool,
}

#[get("/accounting/status")]
pub async fn accounting_status(session: web::ReqData<SessionData>) -> Result<HttpResponse> {
    let session = session.into_inner();

    Ok(HttpResponse::Ok().json(AccountingStatusResponse {
        connected: session.has_accounting_access(),
    }))
}

fn connect_schema() -> Kind {
    Kind::object(vec![
        Field::new("realmId", Kind::String),
        Field::new("accessToken", Kind::String),
    ])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectAccountingRequest {
    realm_id: String,
    access_token: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectAccountingResponse {
    pub success: bool,
    pub message: String,
}

#[post("/accounting/connect")]
pub async fn connect_accounting(
    body: web::Json<Value>,
    db: web::Data<MongoDbContext>,
    session_manager: web::Data<SessionManager>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let input: ConnectAccountingRequest = schema::parse(&connect_schema(), &body)?;
    let session = session.into_inner();

    let connection = AccountingConnection {
        realm_id: input.realm_id,
        access_token: input.access_token,
        connected_at: Utc::now(),
    };

    db.accounts()
        .set_accounting(&session.account_id, Some(&connection))
        .await?;
    session_manager.set_accounting_connected(&session.session_id, true)?;

    log::info!(
        "Connected accounting realm {} for account {}",
        connection.realm_id,
        session.account_id.to_hex()
    );

    Ok(HttpResponse::Ok().json(ConnectAccountingResponse {
        success: true,
        message: "Accounting connected".to_string(),
    }))
}

#[post("/accounting/disconnect")]
pub async fn disconnect_accounting(
    db: web::Data<MongoDbContext>,
    session_manager: web::Data<SessionManager>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let session = session.into_inner();

    db.accounts()
        .set_accounting(&session.account_id, None)
        .await?;
    session_manager.set_accounting_connected(&session.session_id, false)?;

    log::info!(
        "Disconnected accounting for account {}",
        session.account_id.to_hex()
    );

    Ok(HttpResponse::Ok().json(ConnectAccountingResponse {
        success: true,
        message: "Accounting disconnected".to_string(),
    }))
}
