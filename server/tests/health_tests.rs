use actix_web::{test, web, App};
use mongodb::bson::oid::ObjectId;

use receipt_server::db::models::Account;
use receipt_server::handlers;
use receipt_server::session::SessionManager;

#[actix_web::test]
async fn test_health_check() {
    let session_manager = SessionManager::new(24);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .service(handlers::health_check),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeSessions"], 0);
}

#[actix_web::test]
async fn test_health_check_counts_sessions() {
    let session_manager = SessionManager::new(24);

    let mut account = Account::new(
        "org@example.com".to_string(),
        "Example Org".to_string(),
        "password123",
    )
    .unwrap();
    account.id = Some(ObjectId::new());
    session_manager.create_session(&account).unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(session_manager.clone()))
            .service(handlers::health_check),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeSessions"], 1);
}

#[actix_web::test]
async fn test_health_check_without_session_manager() {
    let app = test::init_service(App::new().service(handlers::health_check)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["activeSessions"], 0);
}
