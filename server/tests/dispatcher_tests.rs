use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::middleware::from_fn;
use actix_web::{test, web, App, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use receipt_server::db::models::Account;
use receipt_server::error::ApiError;
use receipt_server::handlers;
use receipt_server::middleware::{accounting_middleware, auth_middleware};
use receipt_server::schema::{self, date_range_kind, DateRange, Field, Kind};
use receipt_server::session::SessionManager;
use receipt_server::signing::{now_ms, SigningService};

fn test_account() -> Account {
    let mut account = Account::new(
        "org@example.com".to_string(),
        "Example Org".to_string(),
        "password123",
    )
    .expect("account");
    account.id = Some(ObjectId::new());
    account
}

fn session_cookie(session_id: &str) -> Cookie<'static> {
    Cookie::new("session_id", session_id.to_string())
}

#[actix_web::test]
async fn test_unauthenticated_request_is_401_and_handler_never_runs() {
    let called = Arc::new(AtomicBool::new(false));
    let called_in_handler = called.clone();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(SessionManager::new(24)))
            .service(web::scope("").wrap(from_fn(auth_middleware)).route(
                "/spy",
                web::post().to(move || {
                    let called = called_in_handler.clone();
                    async move {
                        called.store(true, Ordering::SeqCst);
                        HttpResponse::Ok().json(json!({ "success": true }))
                    }
                }),
            )),
    )
    .await;

    let req = test::TestRequest::post().uri("/spy").to_request();
    let status = match test::try_call_service(&app, req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    };

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!called.load(Ordering::SeqCst), "handler must not run");
}

#[actix_web::test]
async fn test_authenticated_request_reaches_handler() {
    let session_manager = SessionManager::new(24);
    let session = session_manager.create_session(&test_account()).unwrap();

    let called = Arc::new(AtomicBool::new(false));
    let called_in_handler = called.clone();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .service(web::scope("").wrap(from_fn(auth_middleware)).route(
                "/spy",
                web::post().to(move || {
                    let called = called_in_handler.clone();
                    async move {
                        called.store(true, Ordering::SeqCst);
                        HttpResponse::Ok().json(json!({ "success": true }))
                    }
                }),
            )),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/spy")
        .cookie(session_cookie(&session.session_id))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(called.load(Ordering::SeqCst));
}

#[actix_web::test]
async fn test_bearer_token_resolves_session() {
    let session_manager = SessionManager::new(24);
    let account = test_account();
    let session = session_manager.create_session(&account).unwrap();

    let signing = SigningService::new(
        b"01234567890123456789012345678901".to_vec(),
        Duration::from_secs(3600),
    )
    .unwrap();
    let token = signing
        .issue_session_token(
            account.id.unwrap().to_hex(),
            session.session_id.clone(),
            now_ms(),
        )
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .app_data(web::Data::new(signing.clone()))
            .service(
                web::scope("")
                    .wrap(from_fn(auth_middleware))
                    .route("/me", web::get().to(HttpResponse::Ok)),
            ),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // A forged token is refused
    let req = test::TestRequest::get()
        .uri("/me")
        .insert_header(("Authorization", "Bearer not.a.token"))
        .to_request();
    let status = match test::try_call_service(&app, req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_method_outside_allow_list_is_405_on_public_route() {
    let app = test::init_service(
        App::new()
            .service(web::resource("/auth/login").route(web::post().to(handlers::login))),
    )
    .await;

    let req = test::TestRequest::get().uri("/auth/login").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[actix_web::test]
async fn test_method_outside_allow_list_is_405_for_authenticated_caller() {
    let session_manager = SessionManager::new(24);
    let session = session_manager.create_session(&test_account()).unwrap();

    let called = Arc::new(AtomicBool::new(false));
    let called_in_handler = called.clone();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .service(web::scope("").wrap(from_fn(auth_middleware)).service(
                web::resource("/spy").route(web::post().to(move || {
                    let called = called_in_handler.clone();
                    async move {
                        called.store(true, Ordering::SeqCst);
                        HttpResponse::Ok().finish()
                    }
                })),
            )),
    )
    .await;

    let req = test::TestRequest::delete()
        .uri("/spy")
        .cookie(session_cookie(&session.session_id))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(!called.load(Ordering::SeqCst), "handler must not run");
}

async fn not_subscribed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::business(
        StatusCode::PAYMENT_REQUIRED,
        "User is not subscribed",
    ))
}

#[actix_web::test]
async fn test_business_error_status_and_message_are_preserved() {
    let app = test::init_service(
        App::new().route("/paid-feature", web::post().to(not_subscribed)),
    )
    .await;

    let req = test::TestRequest::post().uri("/paid-feature").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "User is not subscribed");
}

async fn blows_up() -> Result<HttpResponse, ApiError> {
    Err(ApiError::Internal(
        "connection string with credentials".to_string(),
    ))
}

#[actix_web::test]
async fn test_unexpected_error_is_generic_500() {
    let app = test::init_service(App::new().route("/boom", web::post().to(blows_up))).await;

    let req = test::TestRequest::post().uri("/boom").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = test::read_body(resp).await;
    let body = String::from_utf8_lossy(&body);
    assert!(
        !body.contains("connection string"),
        "internal detail must not leak: {}",
        body
    );
    assert!(body.contains("Internal server error"));
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeRequest {
    #[allow(dead_code)]
    date_range: DateRange,
}

async fn validated(body: web::Json<serde_json::Value>) -> Result<HttpResponse, ApiError> {
    let kind = Kind::object(vec![Field::new("dateRange", date_range_kind())]);
    let _input: RangeRequest = schema::parse(&kind, &body)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[actix_web::test]
async fn test_validation_failure_surfaces_as_400_with_fields() {
    let app = test::init_service(App::new().route("/validated", web::post().to(validated))).await;

    let req = test::TestRequest::post()
        .uri("/validated")
        .set_json(json!({ "dateRange": { "startDate": "2024-01-01" } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["fields"][0]["field"], "dateRange.endDate");

    // A valid body goes through the same route untouched
    let req = test::TestRequest::post()
        .uri("/validated")
        .set_json(json!({
            "dateRange": { "startDate": "2024-01-01", "endDate": "2024-01-02" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_accounting_guard_requires_permission() {
    let session_manager = SessionManager::new(24);
    let session = session_manager.create_session(&test_account()).unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .service(
                web::scope("").wrap(from_fn(auth_middleware)).service(
                    web::scope("")
                        .wrap(from_fn(accounting_middleware))
                        .route("/import", web::post().to(HttpResponse::Ok)),
                ),
            ),
    )
    .await;

    // Session exists but the integration permission is missing
    let req = test::TestRequest::post()
        .uri("/import")
        .cookie(session_cookie(&session.session_id))
        .to_request();
    let status = match test::try_call_service(&app, req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Granting the permission on the live session opens the gate
    session_manager
        .set_accounting_connected(&session.session_id, true)
        .unwrap();

    let req = test::TestRequest::post()
        .uri("/import")
        .cookie(session_cookie(&session.session_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
