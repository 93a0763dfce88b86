use crate::catalog::{Book, BookFilter, PriceTiers};
use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                category TEXT NOT NULL,
                year INTEGER NOT NULL,
                description TEXT NOT NULL,
                cover_url TEXT NOT NULL,
                pdf_path TEXT NOT NULL,
                price_purchase INTEGER NOT NULL,
                price_rent_2_weeks INTEGER NOT NULL,
                price_rent_1_month INTEGER NOT NULL,
                price_rent_3_months INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'available',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Purchases table (set semantics via primary key)
            CREATE TABLE IF NOT EXISTS purchases (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                purchased_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Rentals table (one record per user and book)
            CREATE TABLE IF NOT EXISTS rentals (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                end_date INTEGER NOT NULL,
                period TEXT NOT NULL,
                rented_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Notifications table (append-only, read flag mutable)
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT,
                kind TEXT,
                message TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_category ON books(category);
            CREATE INDEX IF NOT EXISTS idx_purchases_user ON purchases(user_id);
            CREATE INDEX IF NOT EXISTS idx_rentals_user ON rentals(user_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, email, password_hash, role, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.role,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Validation(format!("Email '{}' is already registered", user.email))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash, role, created_at, last_login
             FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash, role, created_at, last_login
             FROM users WHERE id = ?1",
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, email, password_hash, role, created_at, last_login
                 FROM users ORDER BY email",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE email = ?2",
                params![password_hash, email],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Delete user.
    pub fn delete_user(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE email = ?1", params![email])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at)
             VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== BOOK OPERATIONS ==========

    /// Create a book.
    pub fn create_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books
             (id, title, author, category, year, description, cover_url, pdf_path,
              price_purchase, price_rent_2_weeks, price_rent_1_month, price_rent_3_months,
              status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                book.id,
                book.title,
                book.author,
                book.category,
                book.year,
                book.description,
                book.cover_url,
                book.pdf_path,
                book.price.purchase,
                book.price.rent_2_weeks,
                book.price.rent_1_month,
                book.price.rent_3_months,
                book.status,
                book.created_at,
                book.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create book: {}", e)))?;
        Ok(())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE id = ?1", BOOK_SELECT),
            params![id],
            row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// List books matching a filter.
    pub fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        let mut sql = BOOK_SELECT.to_string();
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(category) = &filter.category {
            clauses.push("category = ?");
            args.push(Box::new(category.clone()));
        }
        if let Some(author) = &filter.author {
            clauses.push("author LIKE '%' || ? || '%'");
            args.push(Box::new(author.clone()));
        }
        if let Some(year) = filter.year {
            clauses.push("year = ?");
            args.push(Box::new(year));
        }
        if filter.only_available {
            clauses.push("status = 'available'");
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY title");

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Update a book.
    pub fn update_book(&self, book: &Book) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET
                 title = ?1, author = ?2, category = ?3, year = ?4, description = ?5,
                 cover_url = ?6, pdf_path = ?7, price_purchase = ?8, price_rent_2_weeks = ?9,
                 price_rent_1_month = ?10, price_rent_3_months = ?11, status = ?12,
                 updated_at = ?13
                 WHERE id = ?14",
                params![
                    book.title,
                    book.author,
                    book.category,
                    book.year,
                    book.description,
                    book.cover_url,
                    book.pdf_path,
                    book.price.purchase,
                    book.price.rent_2_weeks,
                    book.price.rent_1_month,
                    book.price.rent_3_months,
                    book.status,
                    book.updated_at,
                    book.id,
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update book: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete book. Entitlement rows cascade.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM books WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== PURCHASE OPERATIONS ==========

    /// Whether a user has purchased a book.
    pub fn has_purchase(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT 1 FROM purchases WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
            |_| Ok(()),
        )
        .optional()
        .map(|r| r.is_some())
        .map_err(|e| AppError::Internal(format!("Failed to check purchase: {}", e)))
    }

    /// Record a purchase.
    pub fn add_purchase(&self, user_id: &str, book_id: &str, purchased_at: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO purchases (user_id, book_id, purchased_at) VALUES (?1, ?2, ?3)",
            params![user_id, book_id, purchased_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to record purchase: {}", e)))?;
        Ok(())
    }

    /// Get the books a user has purchased.
    pub fn get_purchased_books(&self, user_id: &str) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{} JOIN purchases p ON books.id = p.book_id
                 WHERE p.user_id = ?1 ORDER BY p.purchased_at",
                BOOK_SELECT
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(params![user_id], row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to get purchases: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect purchases: {}", e)))?;

        Ok(books)
    }

    /// Count of purchased books for a user.
    pub fn purchase_count(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM purchases WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count purchases: {}", e)))
    }

    // ========== RENTAL OPERATIONS ==========

    /// Get the rental record for a (user, book) pair.
    pub fn get_rental(&self, user_id: &str, book_id: &str) -> Result<Option<Rental>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT user_id, book_id, end_date, period, rented_at
             FROM rentals WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
            row_to_rental,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get rental: {}", e)))
    }

    /// Save or renew a rental. Renewal replaces the end date and period.
    pub fn save_rental(&self, rental: &Rental) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rentals (user_id, book_id, end_date, period, rented_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (user_id, book_id) DO UPDATE SET
                end_date = excluded.end_date,
                period = excluded.period,
                rented_at = excluded.rented_at",
            params![
                rental.user_id,
                rental.book_id,
                rental.end_date,
                rental.period,
                rental.rented_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save rental: {}", e)))?;
        Ok(())
    }

    /// Get all rentals for a user.
    pub fn get_user_rentals(&self, user_id: &str) -> Result<Vec<Rental>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, book_id, end_date, period, rented_at
                 FROM rentals WHERE user_id = ?1 ORDER BY end_date",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let rentals = stmt
            .query_map(params![user_id], row_to_rental)
            .map_err(|e| AppError::Internal(format!("Failed to get rentals: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect rentals: {}", e)))?;

        Ok(rentals)
    }

    /// IDs of users that currently hold at least one rental.
    pub fn list_users_with_rentals(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT DISTINCT user_id FROM rentals")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to list renters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect renters: {}", e)))?;

        Ok(ids)
    }

    // ========== NOTIFICATION OPERATIONS ==========

    /// Append a notification to a user's log.
    pub fn add_notification(&self, notification: &Notification) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notifications (id, user_id, book_id, kind, message, created_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                notification.id,
                notification.user_id,
                notification.book_id,
                notification.kind,
                notification.message,
                notification.created_at,
                notification.read,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to add notification: {}", e)))?;
        Ok(())
    }

    /// Get a user's notifications, newest first.
    pub fn get_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, book_id, kind, message, created_at, read
                 FROM notifications WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let notifications = stmt
            .query_map(params![user_id], row_to_notification)
            .map_err(|e| AppError::Internal(format!("Failed to get notifications: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect notifications: {}", e)))?;

        Ok(notifications)
    }

    /// Whether a rental notice with this (book, kind) key already exists
    /// since the given instant. Notices from a previous rental term do
    /// not count.
    pub fn has_rental_notice(
        &self,
        user_id: &str,
        book_id: &str,
        kind: &str,
        since: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT 1 FROM notifications
             WHERE user_id = ?1 AND book_id = ?2 AND kind = ?3 AND created_at >= ?4",
            params![user_id, book_id, kind, since],
            |_| Ok(()),
        )
        .optional()
        .map(|r| r.is_some())
        .map_err(|e| AppError::Internal(format!("Failed to check notice: {}", e)))
    }

    /// Mark a notification as read. Returns false when the id does not
    /// belong to this user's log.
    pub fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                params![notification_id, user_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to mark notification: {}", e)))?;
        Ok(rows > 0)
    }

    /// Count of unread notifications for a user.
    pub fn unread_count(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count notifications: {}", e)))
    }
}

/// Shared SELECT column list for books.
const BOOK_SELECT: &str = "SELECT books.id, books.title, books.author, books.category, books.year,
        books.description, books.cover_url, books.pdf_path,
        books.price_purchase, books.price_rent_2_weeks, books.price_rent_1_month,
        books.price_rent_3_months, books.status, books.created_at, books.updated_at
 FROM books";

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
        last_login: row.get(5)?,
    })
}

fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        category: row.get(3)?,
        year: row.get(4)?,
        description: row.get(5)?,
        cover_url: row.get(6)?,
        pdf_path: row.get(7)?,
        price: PriceTiers {
            purchase: row.get(8)?,
            rent_2_weeks: row.get(9)?,
            rent_1_month: row.get(10)?,
            rent_3_months: row.get(11)?,
        },
        status: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn row_to_rental(row: &rusqlite::Row) -> rusqlite::Result<Rental> {
    Ok(Rental {
        user_id: row.get(0)?,
        book_id: row.get(1)?,
        end_date: row.get(2)?,
        period: row.get(3)?,
        rented_at: row.get(4)?,
    })
}

fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        book_id: row.get(2)?,
        kind: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
        read: row.get(6)?,
    })
}
