//! Entitlements, access gate and notifications.
//!
//! All operations are short-lived read-modify-write transactions against
//! the database; nothing here trusts client-supplied entitlement state.

use crate::catalog::Book;
use crate::db::{Database, Notification, Rental, now_timestamp, timestamp_to_datetime};
use crate::error::{AppError, Result};
use crate::rental::{self, RentalPeriod, RentalStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of a successful rental or renewal.
#[derive(Debug, Clone, Serialize)]
pub struct RentalReceipt {
    /// Rental end timestamp.
    pub end_date: i64,
    /// Period code the rental was taken out for.
    pub period: String,
    /// Price of the matching tier.
    pub price: u32,
}

/// A rented book with its lifecycle state, for display.
#[derive(Debug, Clone, Serialize)]
pub struct RentedBookView {
    /// The rented book.
    pub book: Book,
    /// Rental end timestamp.
    pub end_date: i64,
    /// Period code.
    pub period: String,
    /// Lifecycle state at the time of the query.
    pub status: RentalStatus,
    /// Whether the rental has expired.
    pub is_expired: bool,
    /// Whole days remaining (0 when expired).
    pub days_left: i64,
}

/// A user's purchased and rented books.
#[derive(Debug, Clone, Serialize)]
pub struct UserBooks {
    /// Permanently owned books.
    pub purchased_books: Vec<Book>,
    /// Rented books with lifecycle state.
    pub rented_books: Vec<RentedBookView>,
}

/// Store service: purchases, rentals, the access gate and the
/// notification log.
pub struct StoreService {
    db: Database,
    warning_window_days: i64,
}

impl StoreService {
    /// Create a new store service.
    pub fn new(db: Database, warning_window_days: i64) -> Self {
        Self {
            db,
            warning_window_days,
        }
    }

    fn book_for_sale(&self, book_id: &str) -> Result<Book> {
        let book = self
            .db
            .get_book(book_id)?
            .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", book_id)))?;

        if !book.is_available() {
            return Err(AppError::BookUnavailable(book.title.clone()));
        }

        Ok(book)
    }

    fn require_user(&self, user_id: &str) -> Result<()> {
        if self.db.get_user_by_id(user_id)?.is_none() {
            return Err(AppError::NotFound(format!("User not found: {}", user_id)));
        }
        Ok(())
    }

    // ========== ENTITLEMENT MUTATIONS ==========

    /// Purchase a book. Returns the purchase price.
    ///
    /// A second purchase of the same book is an [`AppError::AlreadyOwned`]
    /// error; the purchased set never holds duplicates.
    pub fn purchase(&self, user_id: &str, book_id: &str) -> Result<(Book, u32)> {
        self.require_user(user_id)?;
        let book = self.book_for_sale(book_id)?;

        if self.db.has_purchase(user_id, book_id)? {
            return Err(AppError::AlreadyOwned(book.title.clone()));
        }

        self.db.add_purchase(user_id, book_id, now_timestamp())?;
        tracing::info!(user = %user_id, book = %book_id, "Book purchased");

        let price = book.price.purchase;
        Ok((book, price))
    }

    /// Rent a book, or renew an existing rental.
    pub fn rent(&self, user_id: &str, book_id: &str, period_code: &str) -> Result<(Book, RentalReceipt)> {
        self.rent_at(user_id, book_id, period_code, Utc::now())
    }

    /// Rent a book at an explicit instant.
    ///
    /// Renewal semantics: if the user already rents this book, the end
    /// date is recomputed fresh from `now + period` and the record is
    /// replaced in place; the rental count for the pair never grows.
    pub fn rent_at(
        &self,
        user_id: &str,
        book_id: &str,
        period_code: &str,
        now: DateTime<Utc>,
    ) -> Result<(Book, RentalReceipt)> {
        let period = RentalPeriod::parse(period_code)?;

        self.require_user(user_id)?;
        let book = self.book_for_sale(book_id)?;

        let end_date = period.end_date_from(now);
        let renewal = self.db.get_rental(user_id, book_id)?.is_some();

        let rental = Rental {
            user_id: user_id.to_string(),
            book_id: book_id.to_string(),
            end_date: end_date.timestamp(),
            period: period.code().to_string(),
            rented_at: now.timestamp(),
        };
        self.db.save_rental(&rental)?;

        tracing::info!(
            user = %user_id,
            book = %book_id,
            period = period.code(),
            renewal = renewal,
            "Book rented"
        );

        let price = match period {
            RentalPeriod::TwoWeeks => book.price.rent_2_weeks,
            RentalPeriod::OneMonth => book.price.rent_1_month,
            RentalPeriod::ThreeMonths => book.price.rent_3_months,
        };

        let receipt = RentalReceipt {
            end_date: rental.end_date,
            period: rental.period.clone(),
            price,
        };
        Ok((book, receipt))
    }

    // ========== ACCESS GATE ==========

    /// Whether a user may read a book's content: purchased, or rented
    /// with an end date strictly in the future.
    pub fn can_read(&self, user_id: &str, book_id: &str) -> Result<bool> {
        self.can_read_at(user_id, book_id, Utc::now())
    }

    /// Access check at an explicit instant. Never mutates state; an
    /// expired or absent rental is simply "no access via rental".
    pub fn can_read_at(&self, user_id: &str, book_id: &str, now: DateTime<Utc>) -> Result<bool> {
        if self.db.has_purchase(user_id, book_id)? {
            return Ok(true);
        }

        match self.db.get_rental(user_id, book_id)? {
            Some(rental) => Ok(timestamp_to_datetime(rental.end_date) > now),
            None => Ok(false),
        }
    }

    // ========== USER VIEWS ==========

    /// A user's purchased and rented books with lifecycle state.
    pub fn user_books(&self, user_id: &str) -> Result<UserBooks> {
        self.user_books_at(user_id, Utc::now())
    }

    /// User books view at an explicit instant.
    pub fn user_books_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<UserBooks> {
        self.require_user(user_id)?;

        let purchased_books = self.db.get_purchased_books(user_id)?;

        let mut rented_books = Vec::new();
        for rental in self.db.get_user_rentals(user_id)? {
            // Dangling references (book deleted) are skipped, not an error.
            let Some(book) = self.db.get_book(&rental.book_id)? else {
                continue;
            };

            let end = timestamp_to_datetime(rental.end_date);
            let status = rental::classify(end, now, self.warning_window_days);

            rented_books.push(RentedBookView {
                book,
                end_date: rental.end_date,
                period: rental.period.clone(),
                status,
                is_expired: status == RentalStatus::Expired,
                days_left: rental::days_remaining(end, now),
            });
        }

        Ok(UserBooks {
            purchased_books,
            rented_books,
        })
    }

    // ========== EXPIRATION SWEEP ==========

    /// Check a user's rentals and emit due notifications. Returns the
    /// number of notifications emitted.
    pub fn check_expirations(&self, user_id: &str) -> Result<usize> {
        self.check_expirations_at(user_id, Utc::now())
    }

    /// Expiration check at an explicit instant.
    ///
    /// Emission is idempotent: at most one notice per (book, kind) while
    /// the condition persists, keyed structurally rather than by message
    /// text.
    pub fn check_expirations_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let mut emitted = 0;

        for rental in self.db.get_user_rentals(user_id)? {
            let end = timestamp_to_datetime(rental.end_date);
            let status = rental::classify(end, now, self.warning_window_days);

            let Some(kind) = rental::notice_for(status) else {
                continue;
            };

            let Some(book) = self.db.get_book(&rental.book_id)? else {
                continue;
            };

            if self
                .db
                .has_rental_notice(user_id, &rental.book_id, kind.code(), rental.rented_at)?
            {
                continue;
            }

            let message = match status {
                RentalStatus::ExpiringSoon => format!(
                    "Rental of \"{}\" expires in {} days ({}).",
                    book.title,
                    rental::days_remaining(end, now),
                    end.format("%Y-%m-%d")
                ),
                _ => format!(
                    "Rental of \"{}\" expired on {}.",
                    book.title,
                    end.format("%Y-%m-%d")
                ),
            };

            self.db.add_notification(&Notification {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                book_id: Some(rental.book_id.clone()),
                kind: Some(kind.code().to_string()),
                message,
                created_at: now.timestamp(),
                read: false,
            })?;
            emitted += 1;
        }

        Ok(emitted)
    }

    /// Sweep every user holding rentals. Returns the total number of
    /// notifications emitted.
    pub fn check_all_rentals(&self) -> Result<usize> {
        self.check_all_rentals_at(Utc::now())
    }

    /// Full sweep at an explicit instant. Each user's document is
    /// independent; concurrent sweeps are safe.
    pub fn check_all_rentals_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut total = 0;
        for user_id in self.db.list_users_with_rentals()? {
            total += self.check_expirations_at(&user_id, now)?;
        }

        tracing::info!(notifications = total, "Rental expiration sweep complete");
        Ok(total)
    }

    // ========== NOTIFICATION LOG ==========

    /// Append a generic notification to a user's log.
    pub fn notify(&self, user_id: &str, message: &str) -> Result<Notification> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            book_id: None,
            kind: None,
            message: message.to_string(),
            created_at: now_timestamp(),
            read: false,
        };
        self.db.add_notification(&notification)?;
        Ok(notification)
    }

    /// A user's notifications, newest first.
    pub fn notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.db.get_notifications(user_id)
    }

    /// Flip a notification's read flag.
    pub fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> Result<()> {
        if !self.db.mark_notification_read(user_id, notification_id)? {
            return Err(AppError::NotFound(format!(
                "Notification not found: {}",
                notification_id
            )));
        }
        Ok(())
    }

    /// Count of unread notifications.
    pub fn unread_count(&self, user_id: &str) -> Result<i64> {
        self.db.unread_count(user_id)
    }
}
