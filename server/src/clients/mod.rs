pub mod accounting;
pub mod email;

pub use accounting::{AccountingClient, HttpAccountingClient, ImportedDonation};
pub use email::{HttpMailer, ReceiptEmail, ReceiptMailer};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}
