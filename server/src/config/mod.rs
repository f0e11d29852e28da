use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub organization: OrganizationConfig,
    pub accounting: AccountingConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationConfig {
    pub name: String,
    pub receipt_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_base_url: String,
    pub from_address: String,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| ApiError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[organization]
name = "Example Charity"
receipt_prefix = "RCPT"

[accounting]
api_base_url = "https://accounting.example.com"

[email]
api_base_url = "https://mail.example.com"
from_address = "receipts@example.org"
    "#;

    #[test]
    fn test_parse_valid_config() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.organization.name, "Example Charity");
        assert_eq!(config.organization.receipt_prefix, "RCPT");
        assert_eq!(config.accounting.api_base_url, "https://accounting.example.com");
        assert_eq!(config.email.from_address, "receipts@example.org");
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let broken = r#"
[organization]
name = "Example Charity"
receipt_prefix = "RCPT"
        "#;
        assert!(toml::from_str::<AppConfig>(broken).is_err());
    }
}
