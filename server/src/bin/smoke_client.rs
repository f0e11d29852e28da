use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::{Datelike, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use receipt_server::signing::webhook_signature;

#[derive(Debug, Clone)]
struct SmokeConfig {
    http_base: String,
    email: String,
    password: String,
    org_name: String,
    realm_id: String,
    access_token: String,
    webhook_secret: Option<String>,
    timeout_ms: u64,
    skip_accounting: bool,
    skip_generate: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: bool,
    account_id: String,
    auth_token: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DonationEntry {
    number: i64,
    receipted: bool,
}

#[derive(Debug, Deserialize)]
struct DonationListResponse {
    donations: Vec<DonationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptEntry {
    receipt_number: String,
    total_cents: i64,
    email_sent: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    receipts: Vec<ReceiptEntry>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = parse_args()?;

    println!("[smoke-client] starting smoke run");
    println!("[smoke-client] HTTP base: {}", cfg.http_base);

    let client = reqwest::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_millis(cfg.timeout_ms))
        .build()
        .context("failed to build HTTP client")?;

    let base = cfg.http_base.trim_end_matches('/').to_string();

    // Liveness first; everything else is pointless if this fails
    let health = client
        .get(format!("{}/health", base))
        .send()
        .await
        .context("network failure calling /health")?;
    if health.status() != StatusCode::OK {
        bail!("/health returned {}", health.status());
    }
    println!("[smoke-client] health OK");

    let register = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "email": cfg.email, "password": cfg.password, "name": cfg.org_name }))
        .send()
        .await
        .context("network failure calling /auth/register")?;
    match register.status() {
        StatusCode::OK => println!("[smoke-client] registered {}", cfg.email),
        StatusCode::CONFLICT => println!("[smoke-client] account already exists, continuing"),
        status => {
            let body = register.text().await.unwrap_or_else(|_| "<no body>".to_string());
            bail!("/auth/register failed with {}: {}", status, body);
        }
    }

    let login = client
        .post(format!("{}/auth/login", base))
        .json(&LoginRequest {
            email: &cfg.email,
            password: &cfg.password,
        })
        .send()
        .await
        .context("network failure calling /auth/login")?;
    if login.status() != StatusCode::OK {
        let status = login.status();
        let body = login.text().await.unwrap_or_else(|_| "<no body>".to_string());
        bail!("/auth/login failed with {}: {}", status, body);
    }
    let login: LoginResponse = login
        .json()
        .await
        .context("failed to decode /auth/login response")?;
    if !login.success {
        bail!("/auth/login returned success=false: {}", login.message);
    }
    println!(
        "[smoke-client] login OK: account_id={} token_len={}",
        login.account_id,
        login.auth_token.len()
    );

    if let Some(secret) = &cfg.webhook_secret {
        let body = serde_json::to_vec(&json!({
            "accountId": login.account_id,
            "event": "subscription.activated",
        }))
        .context("failed to encode webhook body")?;
        let signature = webhook_signature(secret.as_bytes(), &body)
            .ok_or_else(|| anyhow!("failed to sign webhook body"))?;

        let webhook = client
            .post(format!("{}/billing/webhook", base))
            .header("X-Billing-Signature", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("network failure calling /billing/webhook")?;
        if webhook.status() != StatusCode::OK {
            let status = webhook.status();
            let text = webhook.text().await.unwrap_or_else(|_| "<no body>".to_string());
            bail!("/billing/webhook failed with {}: {}", status, text);
        }
        println!("[smoke-client] subscription activated via signed webhook");
    } else {
        println!("[smoke-client] no --webhook-secret; skipping subscription activation");
    }

    if !cfg.skip_accounting {
        let connect = client
            .post(format!("{}/accounting/connect", base))
            .json(&json!({ "realmId": cfg.realm_id, "accessToken": cfg.access_token }))
            .send()
            .await
            .context("network failure calling /accounting/connect")?;
        if connect.status() != StatusCode::OK {
            let status = connect.status();
            let body = connect.text().await.unwrap_or_else(|_| "<no body>".to_string());
            bail!("/accounting/connect failed with {}: {}", status, body);
        }
        println!("[smoke-client] accounting connected (realm {})", cfg.realm_id);

        let year = Utc::now().year();
        let range = json!({
            "startDate": format!("{}-01-01", year),
            "endDate": format!("{}-12-31", year),
        });

        let import = client
            .post(format!("{}/donations/import", base))
            .json(&json!({ "dateRange": range }))
            .send()
            .await
            .context("network failure calling /donations/import")?;
        if import.status() == StatusCode::OK {
            println!("[smoke-client] donation import OK");
        } else {
            let status = import.status();
            let body = import.text().await.unwrap_or_else(|_| "<no body>".to_string());
            println!(
                "[smoke-client] donation import not available ({}): {}",
                status, body
            );
        }
    }

    if !cfg.skip_generate {
        let donations = client
            .get(format!("{}/donations", base))
            .send()
            .await
            .context("network failure calling /donations")?;
        if donations.status() != StatusCode::OK {
            bail!("/donations returned {}", donations.status());
        }
        let donations: DonationListResponse = donations
            .json()
            .await
            .context("failed to decode /donations response")?;

        let pending: Vec<i64> = donations
            .donations
            .iter()
            .filter(|d| !d.receipted)
            .map(|d| d.number)
            .collect();
        println!(
            "[smoke-client] {} donations on file, {} without receipts",
            donations.donations.len(),
            pending.len()
        );

        if pending.is_empty() {
            println!("[smoke-client] nothing to receipt; skipping generate");
        } else {
            let year = Utc::now().year();
            let generate = client
                .post(format!("{}/receipts/generate", base))
                .json(&json!({
                    "items": pending,
                    "dateRange": {
                        "startDate": format!("{}-01-01", year),
                        "endDate": format!("{}-12-31", year),
                    },
                }))
                .send()
                .await
                .context("network failure calling /receipts/generate")?;
            if generate.status() != StatusCode::OK {
                let status = generate.status();
                let body = generate.text().await.unwrap_or_else(|_| "<no body>".to_string());
                bail!("/receipts/generate failed with {}: {}", status, body);
            }
            let generated: GenerateResponse = generate
                .json()
                .await
                .context("failed to decode /receipts/generate response")?;
            for receipt in &generated.receipts {
                println!(
                    "[smoke-client] issued {} total_cents={} email_sent={}",
                    receipt.receipt_number, receipt.total_cents, receipt.email_sent
                );
            }
        }
    }

    println!("[smoke-client] smoke run completed successfully");
    Ok(())
}

fn parse_args() -> anyhow::Result<SmokeConfig> {
    let mut cfg = SmokeConfig {
        http_base: "http://127.0.0.1:8080".to_string(),
        email: "smoke@example.com".to_string(),
        password: "smoke-password".to_string(),
        org_name: "Smoke Test Charity".to_string(),
        realm_id: "smoke-realm".to_string(),
        access_token: "smoke-token".to_string(),
        webhook_secret: None,
        timeout_ms: 5_000,
        skip_accounting: false,
        skip_generate: false,
    };

    let mut args = std::env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--http-base" => cfg.http_base = next_arg_value(&mut args, &arg)?,
            "--email" => cfg.email = next_arg_value(&mut args, &arg)?,
            "--password" => cfg.password = next_arg_value(&mut args, &arg)?,
            "--org-name" => cfg.org_name = next_arg_value(&mut args, &arg)?,
            "--realm-id" => cfg.realm_id = next_arg_value(&mut args, &arg)?,
            "--access-token" => cfg.access_token = next_arg_value(&mut args, &arg)?,
            "--webhook-secret" => cfg.webhook_secret = Some(next_arg_value(&mut args, &arg)?),
            "--timeout-ms" => {
                let value = next_arg_value(&mut args, &arg)?;
                cfg.timeout_ms = value
                    .parse::<u64>()
                    .with_context(|| format!("invalid --timeout-ms: {}", value))?;
            }
            "--skip-accounting" => cfg.skip_accounting = true,
            "--skip-generate" => cfg.skip_generate = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                bail!("unknown argument: {}\nUse --help to list options.", other);
            }
        }
    }

    Ok(cfg)
}

fn next_arg_value<I>(args: &mut std::iter::Peekable<I>, flag: &str) -> anyhow::Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| anyhow!("missing value for {}", flag))
}

fn print_help() {
    println!(
        "smoke-client - end-to-end smoke tester for the donation receipt API\n\n\
Usage:\n\
  cargo run --manifest-path server/Cargo.toml --bin smoke-client -- [options]\n\n\
Options:\n\
  --http-base <url>        HTTP base (default: http://127.0.0.1:8080)\n\
  --email <email>          Account email for register/login\n\
  --password <pass>        Account password\n\
  --org-name <name>        Organization name used at registration\n\
  --realm-id <id>          Accounting realm to connect\n\
  --access-token <token>   Accounting access token\n\
  --webhook-secret <s>     Billing webhook secret (enables subscription activation)\n\
  --skip-accounting        Skip accounting connect + import\n\
  --skip-generate          Skip receipt generation\n\
  --timeout-ms <ms>        HTTP timeout (default: 5000)\n\
  --help                   Show this help\n"
    );
}
