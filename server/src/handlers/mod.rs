pub mod accounting;
pub mod auth;
pub mod billing;
pub mod donations;
pub mod health;
pub mod receipts;

pub use accounting::{accounting_status, connect_accounting, disconnect_accounting};
pub use auth::{login, logout, register};
pub use billing::{billing_status, billing_webhook, WebhookSecret};
pub use donations::{import_donations, list_donations};
pub use health::health_check;
pub use receipts::{generate_receipts, list_receipts};
