use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Action name of the row-level duplicate link.
pub const DUPLICATE_ACTION: &str = "duplicate_post";

const MAX_OUTSTANDING_NONCES: usize = 10_000;

#[derive(Debug)]
struct NonceData {
    created_at: Instant,
    username: String,
    action: String,
    subject: String,
}

/// One-time tokens for state-changing GET links.
pub struct NonceStore {
    nonces: Mutex<HashMap<String, NonceData>>,
    expiry: Duration,
}

impl NonceStore {
    pub fn new(expiry: Duration) -> Self {
        NonceStore { nonces: Mutex::new(HashMap::new()), expiry }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NonceData>> {
        self.nonces.lock().unwrap_or_else(|poisoned| {
            log::error!("Nonce store mutex was poisoned! Recovering lock.");
            poisoned.into_inner()
        })
    }

    /// Issues a token valid for `username` performing `action` on `subject`.
    pub fn issue(&self, username: &str, action: &str, subject: &str) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex::encode(bytes);

        let now = Instant::now();
        let mut nonces = self.lock();
        cleanup_expired(&mut nonces, now, self.expiry);
        if nonces.len() >= MAX_OUTSTANDING_NONCES {
            if let Some(oldest) = nonces.iter().min_by_key(|(_, data)| data.created_at).map(|(key, _)| key.clone()) {
                nonces.remove(&oldest);
            }
        }
        nonces.insert(
            nonce.clone(),
            NonceData {
                created_at: now,
                username: username.to_string(),
                action: action.to_string(),
                subject: subject.to_string(),
            },
        );
        nonce
    }

    /// True at most once per issued token, and only for the same user and action.
    /// A supplied `subject` must also match; `None` accepts the token for any subject.
    pub fn verify_and_consume(&self, nonce: &str, username: &str, action: &str, subject: Option<&str>) -> bool {
        let now = Instant::now();
        let mut nonces = self.lock();
        cleanup_expired(&mut nonces, now, self.expiry);
        match nonces.remove(nonce) {
            Some(data) => {
                data.username == username
                    && data.action == action
                    && subject.map_or(true, |subject| data.subject == subject)
            }
            None => false,
        }
    }
}

fn cleanup_expired(nonces: &mut HashMap<String, NonceData>, now: Instant, expiry: Duration) {
    nonces.retain(|_, data| now.duration_since(data.created_at) < expiry);
}
