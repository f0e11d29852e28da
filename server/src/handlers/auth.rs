use actix_web::{cookie::Cookie, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db::models::Account,
    db::MongoDbContext,
    error::{ApiError, Result},
    schema::{self, Field, Kind},
    session::{SessionData, SessionManager},
    signing::{now_ms, SigningService},
};

fn register_schema() -> Kind {
    Kind::object(vec![
        Field::new("email", Kind::String),
        Field::new("password", Kind::String),
        Field::new("name", Kind::String),
    ])
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub account_id: String,
    pub message: String,
}

// Registered manually in main with resource-level rate limiting, hence no
// route macro here (same for login below).
pub async fn register(
    body: web::Json<Value>,
    db: web::Data<MongoDbContext>,
) -> Result<HttpResponse> {
    let input: RegisterRequest = schema::parse(&register_schema(), &body)?;

    if db.accounts().find_by_email(&input.email).await?.is_some() {
        return Err(ApiError::EmailTaken);
    }

    let account = Account::new(input.email, input.name, &input.password)?;
    let account_id = db.accounts().insert(&account).await?;

    log::info!("Registered account {} ({})", account_id.to_hex(), account.email);

    let response = RegisterResponse {
        success: true,
        account_id: account_id.to_hex(),
        message: "Account created".to_string(),
    };

    Ok(HttpResponse::Ok().json(response))
}

fn login_schema() -> Kind {
    Kind::object(vec![
        Field::new("email", Kind::String),
        Field::new("password", Kind::String),
    ])
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub account_id: String,
    pub auth_token: String,
    pub message: String,
}

pub async fn login(
    body: web::Json<Value>,
    db: web::Data<MongoDbContext>,
    session_manager: web::Data<SessionManager>,
    signing: web::Data<SigningService>,
) -> Result<HttpResponse> {
    let input: LoginRequest = schema::parse(&login_schema(), &body)?;

    log::info!("Login attempt for {}", input.email);

    let account = db
        .accounts()
        .find_by_email(&input.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !account.verify_password(&input.password)? {
        log::warn!("Failed login attempt for {}", input.email);
        return Err(ApiError::InvalidCredentials);
    }

    let account_id = account.id.ok_or(ApiError::InvalidCredentials)?;

    // Create session (evicts a previous session for this account)
    let session = session_manager.create_session(&account)?;

    db.accounts().update_last_login(&account_id).await?;

    let auth_token = signing
        .issue_session_token(account_id.to_hex(), session.session_id.clone(), now_ms())
        .map_err(|err| ApiError::Internal(format!("Failed to issue auth token: {err}")))?;

    log::info!(
        "Successful login for {} (session: {})",
        input.email,
        session.session_id
    );

    let cookie = Cookie::build("session_id", session.session_id.clone())
        .path("/")
        .http_only(true)
        .same_site(actix_web::cookie::SameSite::Strict)
        .max_age(actix_web::cookie::time::Duration::hours(
            session_manager.expiry_hours() as i64,
        ))
        .finish();

    let response = LoginResponse {
        success: true,
        account_id: account_id.to_hex(),
        auth_token,
        message: "Login successful".to_string(),
    };

    Ok(HttpResponse::Ok().cookie(cookie).json(response))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

#[post("/auth/logout")]
pub async fn logout(
    session_manager: web::Data<SessionManager>,
    session: web::ReqData<SessionData>,
) -> Result<HttpResponse> {
    let session = session.into_inner();
    session_manager.invalidate_session(&session.session_id);

    log::info!("Logged out (session: {})", session.session_id);

    let cookie = Cookie::build("session_id", "")
        .path("/")
        .max_age(actix_web::cookie::time::Duration::seconds(0))
        .finish();

    let response = LogoutResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok(HttpResponse::Ok().cookie(cookie).json(response))
}
