//! Pending signup sessions
//!
//! Holds email-verification state between `signup/start` and
//! `signup/complete`. Sessions expire after a TTL, allow a bounded number of
//! wrong codes and are consumed exactly once. Only the SHA-256 of the
//! verification code is kept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::types::IbError;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Signup awaiting email verification
#[derive(Debug, Clone)]
pub struct SignupSession {
    pub session_id: String,
    pub email: String,
    pub full_name: String,
    /// Argon2 hash of the chosen password
    pub password_hash: String,
    code_hash: String,
    pub attempts: u32,
    pub verified: bool,
    pub created_at: u64,
    pub expires_at: u64,
}

impl SignupSession {
    pub fn is_expired(&self) -> bool {
        now_secs() >= self.expires_at
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.expires_at.saturating_sub(now_secs())
    }
}

/// Six-digit verification code
fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

/// In-memory signup session store with expiration
pub struct SignupSessionStore {
    sessions: DashMap<String, SignupSession>,

    /// Session id lookup by email; a new start replaces the old session
    by_email: DashMap<String, String>,

    ttl: Duration,
    max_attempts: u32,
    max_sessions: usize,

    last_cleanup: AtomicU64,
}

impl SignupSessionStore {
    pub fn new(ttl_seconds: u64, max_attempts: u32, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            by_email: DashMap::new(),
            ttl: Duration::from_secs(ttl_seconds),
            max_attempts,
            max_sessions,
            last_cleanup: AtomicU64::new(0),
        }
    }

    /// Open a session and return it with the plaintext code to deliver
    pub fn start(
        &self,
        email: &str,
        full_name: &str,
        password_hash: String,
    ) -> Result<(SignupSession, String), IbError> {
        if let Some((_, previous)) = self.by_email.remove(email) {
            self.sessions.remove(&previous);
        }

        if self.sessions.len() >= self.max_sessions {
            self.cleanup();
            if self.sessions.len() >= self.max_sessions {
                return Err(IbError::TooManyAttempts(
                    "Too many pending signups, try again later".into(),
                ));
            }
        }

        let code = generate_code();
        let now = now_secs();
        let session = SignupSession {
            session_id: format!("signup_{}", uuid::Uuid::new_v4()),
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash,
            code_hash: hash_code(&code),
            attempts: 0,
            verified: false,
            created_at: now,
            expires_at: now + self.ttl.as_secs(),
        };

        self.sessions.insert(session.session_id.clone(), session.clone());
        self.by_email.insert(email.to_string(), session.session_id.clone());
        info!("Started signup session for {}", email);

        self.maybe_cleanup();

        Ok((session, code))
    }

    /// Live session by id; expired sessions are dropped on access
    pub fn get(&self, session_id: &str) -> Result<SignupSession, IbError> {
        let session = self
            .sessions
            .get(session_id)
            .map(|s| s.clone())
            .ok_or_else(|| IbError::NotFound("Signup session not found or expired".into()))?;

        if session.is_expired() {
            self.remove(session_id);
            return Err(IbError::NotFound("Signup session not found or expired".into()));
        }
        Ok(session)
    }

    /// Issue a fresh code; attempts reset, expiry unchanged
    pub fn resend(&self, session_id: &str) -> Result<(SignupSession, String), IbError> {
        self.get(session_id)?;
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| IbError::NotFound("Signup session not found or expired".into()))?;

        if session.verified {
            return Err(IbError::Conflict("Email already verified".into()));
        }

        let code = generate_code();
        session.code_hash = hash_code(&code);
        session.attempts = 0;
        Ok((session.clone(), code))
    }

    /// Check a code. A wrong code costs one attempt; running out of attempts
    /// destroys the session.
    pub fn verify(&self, session_id: &str, code: &str) -> Result<SignupSession, IbError> {
        self.get(session_id)?;

        let outcome = {
            let mut session = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| IbError::NotFound("Signup session not found or expired".into()))?;

            if session.verified {
                return Ok(session.clone());
            }

            if session.code_hash == hash_code(code) {
                session.verified = true;
                Ok(session.clone())
            } else {
                session.attempts += 1;
                Err(session.attempts)
            }
        };

        match outcome {
            Ok(session) => {
                debug!("Signup session {} verified", session_id);
                Ok(session)
            }
            Err(attempts) if attempts >= self.max_attempts => {
                self.remove(session_id);
                Err(IbError::TooManyAttempts(
                    "Too many incorrect codes, start signup again".into(),
                ))
            }
            Err(attempts) => Err(IbError::Validation(format!(
                "Invalid verification code ({} attempts left)",
                self.max_attempts - attempts
            ))),
        }
    }

    /// Remove and return a verified session
    pub fn take_verified(&self, session_id: &str) -> Result<SignupSession, IbError> {
        let session = self.get(session_id)?;
        if !session.verified {
            return Err(IbError::Forbidden("Email not verified".into()));
        }
        self.remove(session_id);
        Ok(session)
    }

    pub fn remove(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            self.by_email
                .remove_if(&session.email, |_, id| id == session_id);
            debug!("Removed signup session: {}", session_id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Clean up expired sessions at most once a minute
    fn maybe_cleanup(&self) {
        let now = now_secs();
        let last = self.last_cleanup.load(Ordering::Relaxed);

        if now.saturating_sub(last) < 60 {
            return;
        }

        if self
            .last_cleanup
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            self.cleanup();
        }
    }

    /// Force cleanup of expired sessions
    pub fn cleanup(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_expired())
            .map(|s| s.session_id.clone())
            .collect();

        let count = expired.len();
        for session_id in expired {
            self.remove(&session_id);
        }

        if count > 0 {
            info!("Cleaned up {} expired signup sessions", count);
        }
        count
    }

    /// Background sweep for sessions nobody touches again
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.cleanup();
            }
        })
    }

    pub fn stats(&self) -> SignupStoreStats {
        let total = self.sessions.len();
        let expired = self.sessions.iter().filter(|s| s.is_expired()).count();
        SignupStoreStats {
            total_sessions: total,
            expired_sessions: expired,
            active_sessions: total - expired,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupStoreStats {
    pub total_sessions: usize,
    pub expired_sessions: usize,
    pub active_sessions: usize,
}
