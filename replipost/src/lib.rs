use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::helper::nonce_helpers::NonceStore;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Process-wide state shared by the admin handlers.
pub struct AppState {
    pub nonces: NonceStore,
}

pub mod config;
pub mod duplicator;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;

#[cfg(test)]
mod test_fixtures;
