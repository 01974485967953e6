//! Application state container shared across Axum route handlers and services.

use crate::notify::Notifier;
use sea_orm::DatabaseConnection;

/// Central application state shared across the server.
///
/// This includes:
/// - A cloned, thread-safe database connection for use with SeaORM.
/// - A global `Notifier` for broadcasting integrity flags to subscribed sinks.
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    notifier: Notifier,
}

impl AppState {
    /// Creates a new `AppState` with the given database connection and notifier.
    pub fn new(db: DatabaseConnection, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    /// Returns a shared reference to the internal `DatabaseConnection`.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Returns a shared reference to the internal `Notifier`.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Returns a cloned copy of the database connection.
    ///
    /// Useful for spawning tasks that require ownership.
    pub fn db_clone(&self) -> DatabaseConnection {
        self.db.clone()
    }

    /// Returns a cloned instance of the `Notifier`.
    pub fn notifier_clone(&self) -> Notifier {
        self.notifier.clone()
    }
}
