use dashmap::DashMap;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::db::models::Account;
use crate::error::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct SessionData {
    pub session_id: String,
    pub account_id: ObjectId,
    pub email: String,
    pub name: String,
    pub image_url: Option<String>,
    pub accounting_connected: bool,
    pub expires_at: Instant,
}

impl SessionData {
    pub fn new(account_id: ObjectId, account: &Account, expiry_hours: u64) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(expiry_hours * 3600);

        Self {
            session_id,
            account_id,
            email: account.email.clone(),
            name: account.name.clone(),
            image_url: account.image_url.clone(),
            accounting_connected: account.has_accounting(),
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    // Pure predicate; the accounting guard turns a false into a 401.
    pub fn has_accounting_access(&self) -> bool {
        self.accounting_connected
    }
}

#[derive(Clone)]
pub struct SessionManager {
    // session_id -> SessionData
    sessions: Arc<DashMap<String, SessionData>>,
    // account_id -> session_id
    account_sessions: Arc<DashMap<String, String>>,
    expiry_hours: u64,
}

impl SessionManager {
    pub fn new(expiry_hours: u64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            account_sessions: Arc::new(DashMap::new()),
            expiry_hours,
        }
    }

    pub fn create_session(&self, account: &Account) -> Result<SessionData> {
        let account_id = account.id.ok_or(ApiError::InvalidSession)?;
        let account_id_str = account_id.to_hex();

        // Check for existing session (duplicate login)
        let old_session_id = self
            .account_sessions
            .get(&account_id_str)
            .map(|entry| entry.value().clone());
        if let Some(old_session_id) = old_session_id {
            self.invalidate_session(&old_session_id);
            log::info!("Evicted old session for account: {}", account_id_str);
        }

        let session_data = SessionData::new(account_id, account, self.expiry_hours);

        self.sessions
            .insert(session_data.session_id.clone(), session_data.clone());
        self.account_sessions
            .insert(account_id_str.clone(), session_data.session_id.clone());

        log::info!(
            "Created session {} for account {}",
            session_data.session_id,
            account_id_str
        );

        Ok(session_data)
    }

    pub fn validate_session(&self, session_id: &str) -> Result<SessionData> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or(ApiError::InvalidSession)?;

        if session.is_expired() {
            drop(session);
            self.invalidate_session(session_id);
            return Err(ApiError::InvalidSession);
        }

        Ok(session.clone())
    }

    pub fn invalidate_session(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            self.account_sessions.remove(&session.account_id.to_hex());
            log::info!("Invalidated session: {}", session_id);
        }
    }

    // Keeps a live session's permission flag in step with the account document
    // when the accounting integration is connected or disconnected.
    pub fn set_accounting_connected(&self, session_id: &str, connected: bool) -> Result<()> {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.accounting_connected = connected;
            log::info!(
                "Accounting access {} for session {}",
                if connected { "granted" } else { "revoked" },
                session_id
            );
            Ok(())
        } else {
            Err(ApiError::InvalidSession)
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;

        self.sessions.retain(|session_id, session| {
            if session.is_expired() {
                self.account_sessions.remove(&session.account_id.to_hex());
                log::debug!("Cleaned up expired session: {}", session_id);
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            log::info!("Cleaned up {} expired sessions", removed);
        }

        removed
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn expiry_hours(&self) -> u64 {
        self.expiry_hours
    }
}
