use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use rand::RngCore;
use tokio::sync::Mutex;

const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const LOGIN_WINDOW: Duration = Duration::from_secs(60);
const LOGIN_LIMIT_PER_WINDOW: usize = 5;

/// Issues and validates bearer tokens, and rate-limits login attempts per
/// client address. When `password` is `None`, auth is considered disabled:
/// clients still must send the `auth` message first, but any token value is
/// accepted, matching the "expected but not validated" contract.
pub struct AuthManager {
    password: Option<String>,
    tokens: Mutex<HashMap<String, Instant>>,
    login_attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl AuthManager {
    pub fn new(password: Option<String>) -> Self {
        Self {
            password,
            tokens: Mutex::new(HashMap::new()),
            login_attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password.is_some()
    }

    /// Returns `true` if `client_key` may attempt another login this window,
    /// recording the attempt regardless of outcome.
    pub async fn check_rate_limit(&self, client_key: &str) -> bool {
        let mut attempts = self.login_attempts.lock().await;
        let now = Instant::now();
        let entry = attempts.entry(client_key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < LOGIN_WINDOW);
        if entry.len() >= LOGIN_LIMIT_PER_WINDOW {
            return false;
        }
        entry.push(now);
        true
    }

    /// Validates `password` and, on success, mints and records a fresh
    /// token. `None` password always succeeds (auth disabled).
    pub async fn login(&self, supplied_password: &str) -> Option<String> {
        if let Some(expected) = &self.password {
            if supplied_password != expected {
                return None;
            }
        }
        let token = generate_token();
        self.tokens.lock().await.insert(token.clone(), Instant::now());
        Some(token)
    }

    /// When auth is disabled, any non-empty token is accepted (and recorded
    /// so `prune` has something consistent to walk). When enabled, the token
    /// must have been issued by `login` and not yet expired.
    pub async fn validate(&self, token: &str) -> bool {
        if !self.is_enabled() {
            return !token.is_empty();
        }
        let tokens = self.tokens.lock().await;
        match tokens.get(token) {
            Some(issued_at) => issued_at.elapsed() < TOKEN_TTL,
            None => false,
        }
    }

    /// Removes expired tokens and stale rate-limit windows. Intended to run
    /// on a periodic background task alongside the tutor registry's sweep.
    pub async fn prune(&self) {
        let now = Instant::now();
        {
            let mut tokens = self.tokens.lock().await;
            tokens.retain(|_, issued_at| now.duration_since(*issued_at) < TOKEN_TTL);
        }
        {
            let mut attempts = self.login_attempts.lock().await;
            attempts.retain(|_, hits| {
                hits.retain(|t| now.duration_since(*t) < LOGIN_WINDOW);
                !hits.is_empty()
            });
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
