use actix_web::{get, web, HttpResponse};
use serde::Serialize;

use crate::{error::Result, session::SessionManager};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    pub status: String,
    pub active_sessions: usize,
}

#[get("/health")]
pub async fn health_check(
    session_manager: Option<web::Data<SessionManager>>,
) -> Result<HttpResponse> {
    let active_sessions = session_manager
        .map(|manager| manager.active_session_count())
        .unwrap_or(0);

    let response = HealthCheckResponse {
        status: "healthy".to_string(),
        active_sessions,
    };

    Ok(HttpResponse::Ok().json(response))
}
