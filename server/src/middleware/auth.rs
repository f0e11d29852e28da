use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, HttpMessage,
};

use crate::error::ApiError;
use crate::session::{SessionData, SessionManager};
use crate::signing::{now_ms, SigningService};

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    // Browser callers carry a session cookie; API callers a signed bearer token
    let session_id = match req.cookie("session_id") {
        Some(cookie) => cookie.value().to_string(),
        None => bearer_session_id(&req)?,
    };

    let session_manager = req
        .app_data::<web::Data<SessionManager>>()
        .ok_or_else(|| ApiError::Internal("session manager not configured".to_string()))?;

    let session = session_manager
        .validate_session(&session_id)
        .map_err(|_| ApiError::Unauthorized)?;

    // Hand the resolved session to handlers via ReqData<SessionData>
    req.extensions_mut().insert(session);

    next.call(req).await
}

fn bearer_session_id(req: &ServiceRequest) -> Result<String, actix_web::Error> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let signing = req
        .app_data::<web::Data<SigningService>>()
        .ok_or_else(|| ApiError::Internal("signing service not configured".to_string()))?;

    let claims = signing
        .verify(token, now_ms())
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(claims.session_id)
}

// Gates accounting-scoped routes on the session's integration permission.
// Runs after auth_middleware, so the session is already in extensions.
pub async fn accounting_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let allowed = req
        .extensions()
        .get::<SessionData>()
        .map(SessionData::has_accounting_access)
        .unwrap_or(false);

    if !allowed {
        return Err(ApiError::AccountingNotConnected.into());
    }

    next.call(req).await
}
