mod clients;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod schema;
mod session;
mod signing;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use mongodb::Client;
use tokio::time;

use clients::{AccountingClient, HttpAccountingClient, HttpMailer, ReceiptMailer};
use config::AppConfig;
use db::MongoDbContext;
use handlers::WebhookSecret;
use middleware::{accounting_middleware, auth_middleware, rate_limit_middleware, RateLimiter};
use session::SessionManager;
use signing::SigningService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if it exists (for development)
    if dotenvy::dotenv().is_err() {
        dotenvy::from_filename("server/.env").ok();
    }

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting Donation Receipt Server...");

    // Load configuration
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "server/config/app.toml".to_string());

    let config = AppConfig::load_from_file(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration from '{}': {}", config_path, e);
        eprintln!("Hint: Set CONFIG_PATH environment variable or run from the repository root");
        std::process::exit(1);
    });
    log::info!("Loaded configuration for '{}'", config.organization.name);

    // Connect to MongoDB
    let mongodb_uri =
        std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let database_name =
        std::env::var("DATABASE_NAME").unwrap_or_else(|_| "donation_receipts".to_string());

    log::info!("Connecting to MongoDB at {}...", mongodb_uri);
    let client = Client::with_uri_str(&mongodb_uri)
        .await
        .expect("Failed to connect to MongoDB");

    let db_context = MongoDbContext::new(client, &database_name);

    log::info!("Initializing database indexes...");
    db_context
        .init_indexes()
        .await
        .expect("Failed to initialize database indexes");

    // Create shared state
    let session_expiry_hours = std::env::var("SESSION_EXPIRY_HOURS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(24);

    let session_manager = SessionManager::new(session_expiry_hours);
    let rate_limiter = RateLimiter::new();

    log::info!("Session expiry set to {} hours", session_expiry_hours);

    let auth_secret = std::env::var("AUTH_TOKEN_SECRET").unwrap_or_else(|_| {
        eprintln!("AUTH_TOKEN_SECRET must be set (min 32 bytes)");
        std::process::exit(1);
    });
    let signing = SigningService::new(
        auth_secret.into_bytes(),
        Duration::from_secs(session_expiry_hours * 3600),
    )
    .unwrap_or_else(|e| {
        eprintln!("Invalid AUTH_TOKEN_SECRET: {}", e);
        std::process::exit(1);
    });

    let webhook_secret = std::env::var("BILLING_WEBHOOK_SECRET").unwrap_or_else(|_| {
        eprintln!("BILLING_WEBHOOK_SECRET must be set");
        std::process::exit(1);
    });
    let webhook_secret = WebhookSecret(webhook_secret.into_bytes());

    let email_api_key = std::env::var("EMAIL_API_KEY").unwrap_or_else(|_| {
        eprintln!("EMAIL_API_KEY must be set");
        std::process::exit(1);
    });

    // Outbound integration clients
    let accounting_client = HttpAccountingClient::new(config.accounting.api_base_url.clone())
        .unwrap_or_else(|e| {
            eprintln!("Failed to build accounting client: {}", e);
            std::process::exit(1);
        });
    let accounting_client: web::Data<dyn AccountingClient> =
        web::Data::from(Arc::new(accounting_client) as Arc<dyn AccountingClient>);

    let mailer = HttpMailer::new(
        config.email.api_base_url.clone(),
        email_api_key,
        config.email.from_address.clone(),
    )
    .unwrap_or_else(|e| {
        eprintln!("Failed to build mail client: {}", e);
        std::process::exit(1);
    });
    let mailer: web::Data<dyn ReceiptMailer> =
        web::Data::from(Arc::new(mailer) as Arc<dyn ReceiptMailer>);

    // Spawn background cleanup tasks
    let session_manager_clone = session_manager.clone();
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = session_manager_clone.cleanup_expired();
            if removed > 0 {
                log::info!("Background cleanup: removed {} expired sessions", removed);
            }
        }
    });

    let rate_limiter_clone = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(300)); // Every 5 minutes
        loop {
            interval.tick().await;
            rate_limiter_clone.cleanup_old_entries();
            log::debug!("Background cleanup: cleaned rate limiter entries");
        }
    });

    // Server configuration
    let server_host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let server_port: u16 = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting HTTP server at {}:{}...", server_host, server_port);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            // Shared state
            .app_data(web::Data::new(db_context.clone()))
            .app_data(web::Data::new(session_manager.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(rate_limiter.clone()))
            .app_data(web::Data::new(signing.clone()))
            .app_data(web::Data::new(webhook_secret.clone()))
            .app_data(accounting_client.clone())
            .app_data(mailer.clone())
            // Middleware
            .wrap(actix_middleware::Logger::default())
            .wrap(actix_middleware::Compress::default())
            // Public routes (no authentication required)
            .service(handlers::health_check)
            .service(handlers::billing_webhook)
            .service(
                web::resource("/auth/register")
                    .wrap(actix_middleware::from_fn(rate_limit_middleware))
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/auth/login")
                    .wrap(actix_middleware::from_fn(rate_limit_middleware))
                    .route(web::post().to(handlers::login)),
            )
            // Protected routes (authentication required); kept last so the
            // public resources above are matched first
            .service(
                web::scope("")
                    .wrap(actix_middleware::from_fn(auth_middleware))
                    .service(handlers::logout)
                    .service(handlers::list_donations)
                    .service(handlers::list_receipts)
                    .service(handlers::generate_receipts)
                    .service(handlers::accounting_status)
                    .service(handlers::connect_accounting)
                    .service(handlers::disconnect_accounting)
                    .service(handlers::billing_status)
                    .service(
                        web::scope("")
                            .wrap(actix_middleware::from_fn(accounting_middleware))
                            .service(handlers::import_donations),
                    ),
            )
    })
    .bind((server_host, server_port))?
    .run()
    .await
}
