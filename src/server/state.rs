//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::catalog::Book;
use crate::config::Config;
use crate::db::Database;
use crate::store::StoreService;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Store service (entitlements, access gate, notifications).
    pub store: Arc<StoreService>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: Config, db: Database, auth: AuthService, store: StoreService) -> Self {
        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            store: Arc::new(store),
        }
    }

    /// Resolve the on-disk path of a book's PDF file.
    pub fn pdf_path(&self, book: &Book) -> PathBuf {
        let path = PathBuf::from(&book.pdf_path);
        if path.is_absolute() {
            path
        } else {
            self.config.storage.books_dir.join(path)
        }
    }

    /// Number of books in the catalog.
    pub fn book_count(&self) -> usize {
        self.db
            .list_books(&crate::catalog::BookFilter::default())
            .map(|b| b.len())
            .unwrap_or(0)
    }
}
