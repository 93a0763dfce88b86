use crate::auth::AuthService;
use crate::catalog::{Book, BookFilter, PriceTiers};
use crate::config::Config;
use crate::db::{Database, Notification, Rental, User, now_timestamp};
use crate::error::AppError;
use crate::store::StoreService;
use chrono::{Duration, TimeZone, Utc};

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn test_store(db: &Database) -> StoreService {
    StoreService::new(db.clone(), crate::rental::DEFAULT_WARNING_WINDOW_DAYS)
}

fn create_user(db: &Database, id: &str, email: &str) {
    let user = User {
        id: id.to_string(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        role: "user".to_string(),
        created_at: now_timestamp(),
        last_login: None,
    };
    db.create_user(&user).unwrap();
}

fn create_book(db: &Database, id: &str, title: &str) {
    let book = Book {
        id: id.to_string(),
        title: title.to_string(),
        author: "Test Author".to_string(),
        category: "fiction".to_string(),
        year: 2020,
        description: "A test book".to_string(),
        cover_url: format!("https://covers.test/{}.jpg", id),
        pdf_path: format!("{}.pdf", id),
        price: PriceTiers {
            purchase: 500,
            rent_2_weeks: 100,
            rent_1_month: 150,
            rent_3_months: 300,
        },
        status: "available".to_string(),
        created_at: now_timestamp(),
        updated_at: now_timestamp(),
    };
    db.create_book(&book).unwrap();
}

fn setup_user_and_book(db: &Database) {
    create_user(db, "user-1", "reader@example.com");
    create_book(db, "book-1", "Test Book");
}

// ========== DATABASE ==========

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    let user = User {
        id: "user-1".to_string(),
        email: "alice@example.com".to_string(),
        password_hash: "hash".to_string(),
        role: "user".to_string(),
        created_at: now_timestamp(),
        last_login: None,
    };

    db.create_user(&user).unwrap();

    let found = db.get_user_by_email("alice@example.com").unwrap().unwrap();
    assert_eq!(found.id, "user-1");
    assert_eq!(found.email, "alice@example.com");

    let found_by_id = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(found_by_id.email, "alice@example.com");
}

#[test]
fn db_duplicate_email_fails() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");

    let dup = User {
        id: "user-2".to_string(),
        email: "alice@example.com".to_string(),
        password_hash: "hash2".to_string(),
        role: "user".to_string(),
        created_at: now_timestamp(),
        last_login: None,
    };
    assert!(db.create_user(&dup).is_err());
}

#[test]
fn db_delete_user() {
    let db = test_db();
    create_user(&db, "user-1", "bob@example.com");

    assert!(db.delete_user("bob@example.com").unwrap());
    assert!(db.get_user_by_email("bob@example.com").unwrap().is_none());
}

#[test]
fn db_create_and_get_session() {
    let db = test_db();
    create_user(&db, "user-1", "reader@example.com");

    let session = crate::db::Session {
        token: "token123".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() + 3600,
    };

    db.create_session(&session).unwrap();

    let found = db.get_session("token123").unwrap().unwrap();
    assert_eq!(found.user_id, "user-1");
}

#[test]
fn db_expired_sessions_cleanup() {
    let db = test_db();
    create_user(&db, "user-1", "reader@example.com");

    let expired = crate::db::Session {
        token: "expired".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() - 3600,
    };
    let valid = crate::db::Session {
        token: "valid".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() + 3600,
    };

    db.create_session(&expired).unwrap();
    db.create_session(&valid).unwrap();

    db.cleanup_expired_sessions().unwrap();

    assert!(db.get_session("expired").unwrap().is_none());
    assert!(db.get_session("valid").unwrap().is_some());
}

#[test]
fn db_create_and_get_book() {
    let db = test_db();
    create_book(&db, "book-1", "Dune");

    let found = db.get_book("book-1").unwrap().unwrap();
    assert_eq!(found.title, "Dune");
    assert_eq!(found.price.purchase, 500);
    assert!(found.is_available());

    assert!(db.get_book("missing").unwrap().is_none());
}

#[test]
fn db_list_books_filters() {
    let db = test_db();

    let mut scifi = Book {
        id: "book-1".to_string(),
        title: "Dune".to_string(),
        author: "Frank Herbert".to_string(),
        category: "scifi".to_string(),
        year: 1965,
        description: "Desert planet".to_string(),
        cover_url: "https://covers.test/dune.jpg".to_string(),
        pdf_path: "dune.pdf".to_string(),
        price: PriceTiers::default(),
        status: "available".to_string(),
        created_at: now_timestamp(),
        updated_at: now_timestamp(),
    };
    db.create_book(&scifi).unwrap();

    scifi.id = "book-2".to_string();
    scifi.title = "Dune Messiah".to_string();
    scifi.year = 1969;
    scifi.status = "unavailable".to_string();
    db.create_book(&scifi).unwrap();

    create_book(&db, "book-3", "Plain Fiction");

    let all = db.list_books(&BookFilter::default()).unwrap();
    assert_eq!(all.len(), 3);

    let scifi_only = db
        .list_books(&BookFilter {
            category: Some("scifi".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(scifi_only.len(), 2);

    let by_author = db
        .list_books(&BookFilter {
            author: Some("herbert".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_author.len(), 2);

    let by_year = db
        .list_books(&BookFilter {
            year: Some(1965),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_year.len(), 1);
    assert_eq!(by_year[0].title, "Dune");

    let available = db
        .list_books(&BookFilter {
            category: Some("scifi".to_string()),
            only_available: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].title, "Dune");
}

#[test]
fn db_update_book() {
    let db = test_db();
    create_book(&db, "book-1", "Old Title");

    let mut book = db.get_book("book-1").unwrap().unwrap();
    book.title = "New Title".to_string();
    book.status = "unavailable".to_string();

    assert!(db.update_book(&book).unwrap());

    let found = db.get_book("book-1").unwrap().unwrap();
    assert_eq!(found.title, "New Title");
    assert!(!found.is_available());
}

#[test]
fn db_delete_book_cascades_entitlements() {
    let db = test_db();
    setup_user_and_book(&db);

    db.add_purchase("user-1", "book-1", now_timestamp()).unwrap();
    db.save_rental(&Rental {
        user_id: "user-1".to_string(),
        book_id: "book-1".to_string(),
        end_date: now_timestamp() + 86_400,
        period: "2weeks".to_string(),
        rented_at: now_timestamp(),
    })
    .unwrap();

    assert!(db.delete_book("book-1").unwrap());

    assert!(!db.has_purchase("user-1", "book-1").unwrap());
    assert!(db.get_rental("user-1", "book-1").unwrap().is_none());
}

#[test]
fn db_purchase_roundtrip() {
    let db = test_db();
    setup_user_and_book(&db);
    create_book(&db, "book-2", "Second Book");

    assert!(!db.has_purchase("user-1", "book-1").unwrap());

    db.add_purchase("user-1", "book-1", now_timestamp()).unwrap();
    db.add_purchase("user-1", "book-2", now_timestamp()).unwrap();

    assert!(db.has_purchase("user-1", "book-1").unwrap());
    assert_eq!(db.purchase_count("user-1").unwrap(), 2);

    let books = db.get_purchased_books("user-1").unwrap();
    assert_eq!(books.len(), 2);
}

#[test]
fn db_rental_save_replaces_existing() {
    let db = test_db();
    setup_user_and_book(&db);

    let first_end = now_timestamp() + 86_400;
    db.save_rental(&Rental {
        user_id: "user-1".to_string(),
        book_id: "book-1".to_string(),
        end_date: first_end,
        period: "2weeks".to_string(),
        rented_at: now_timestamp(),
    })
    .unwrap();

    db.save_rental(&Rental {
        user_id: "user-1".to_string(),
        book_id: "book-1".to_string(),
        end_date: first_end + 86_400 * 30,
        period: "1month".to_string(),
        rented_at: now_timestamp(),
    })
    .unwrap();

    let rentals = db.get_user_rentals("user-1").unwrap();
    assert_eq!(rentals.len(), 1);
    assert_eq!(rentals[0].period, "1month");
    assert_eq!(rentals[0].end_date, first_end + 86_400 * 30);
}

#[test]
fn db_list_users_with_rentals() {
    let db = test_db();
    create_user(&db, "user-1", "a@example.com");
    create_user(&db, "user-2", "b@example.com");
    create_book(&db, "book-1", "Rented Book");

    db.save_rental(&Rental {
        user_id: "user-1".to_string(),
        book_id: "book-1".to_string(),
        end_date: now_timestamp() + 86_400,
        period: "2weeks".to_string(),
        rented_at: now_timestamp(),
    })
    .unwrap();

    let renters = db.list_users_with_rentals().unwrap();
    assert_eq!(renters, vec!["user-1".to_string()]);
}

#[test]
fn db_notifications_newest_first() {
    let db = test_db();
    create_user(&db, "user-1", "reader@example.com");

    for i in 0..3 {
        db.add_notification(&Notification {
            id: format!("n-{}", i),
            user_id: "user-1".to_string(),
            book_id: None,
            kind: None,
            message: format!("Message {}", i),
            created_at: 1000 + i,
            read: false,
        })
        .unwrap();
    }

    let notifications = db.get_notifications("user-1").unwrap();
    assert_eq!(notifications.len(), 3);
    assert_eq!(notifications[0].message, "Message 2");
    assert_eq!(notifications[2].message, "Message 0");
}

#[test]
fn db_mark_notification_read_scoped_to_user() {
    let db = test_db();
    create_user(&db, "user-1", "a@example.com");
    create_user(&db, "user-2", "b@example.com");

    db.add_notification(&Notification {
        id: "n-1".to_string(),
        user_id: "user-1".to_string(),
        book_id: None,
        kind: None,
        message: "Hello".to_string(),
        created_at: now_timestamp(),
        read: false,
    })
    .unwrap();

    // Another user cannot touch it
    assert!(!db.mark_notification_read("user-2", "n-1").unwrap());
    assert_eq!(db.unread_count("user-1").unwrap(), 1);

    assert!(db.mark_notification_read("user-1", "n-1").unwrap());
    assert_eq!(db.unread_count("user-1").unwrap(), 0);
}

#[test]
fn db_open_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    let db = Database::open(&path).unwrap();
    create_user(&db, "user-1", "disk@example.com");

    assert!(path.exists());
    assert!(db.get_user_by_id("user-1").unwrap().is_some());
}

// ========== STORE: PURCHASES ==========

#[test]
fn store_purchase_then_already_owned() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let (_, price) = store.purchase("user-1", "book-1").unwrap();
    assert_eq!(price, 500);
    assert!(store.can_read("user-1", "book-1").unwrap());

    let second = store.purchase("user-1", "book-1");
    assert!(matches!(second, Err(AppError::AlreadyOwned(_))));

    // The purchased set is unchanged, access unaffected
    assert_eq!(db.purchase_count("user-1").unwrap(), 1);
    assert!(store.can_read("user-1", "book-1").unwrap());
}

#[test]
fn store_purchase_unavailable_book() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let mut book = db.get_book("book-1").unwrap().unwrap();
    book.status = "unavailable".to_string();
    db.update_book(&book).unwrap();

    let result = store.purchase("user-1", "book-1");
    assert!(matches!(result, Err(AppError::BookUnavailable(_))));
    assert_eq!(db.purchase_count("user-1").unwrap(), 0);
}

#[test]
fn store_purchase_missing_book_or_user() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    assert!(matches!(
        store.purchase("user-1", "missing"),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        store.purchase("ghost", "book-1"),
        Err(AppError::NotFound(_))
    ));
}

// ========== STORE: RENTALS ==========

#[test]
fn store_rent_two_weeks_is_exact() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let (_, receipt) = store.rent_at("user-1", "book-1", "2weeks", now).unwrap();

    assert_eq!(receipt.end_date, (now + Duration::days(14)).timestamp());
    assert_eq!(receipt.period, "2weeks");
    assert_eq!(receipt.price, 100);
}

#[test]
fn store_rent_one_month_leap_year_rollover() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let now = Utc.with_ymd_and_hms(2024, 1, 31, 9, 30, 0).unwrap();
    let (_, receipt) = store.rent_at("user-1", "book-1", "1month", now).unwrap();

    let expected = Utc.with_ymd_and_hms(2024, 2, 29, 9, 30, 0).unwrap();
    assert_eq!(receipt.end_date, expected.timestamp());
    assert_eq!(receipt.price, 150);
}

#[test]
fn store_rent_three_months_price() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let now = Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap();
    let (_, receipt) = store.rent_at("user-1", "book-1", "3months", now).unwrap();

    let expected = Utc.with_ymd_and_hms(2024, 8, 15, 0, 0, 0).unwrap();
    assert_eq!(receipt.end_date, expected.timestamp());
    assert_eq!(receipt.price, 300);
}

#[test]
fn store_rent_invalid_period() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let result = store.rent("user-1", "book-1", "6months");
    assert!(matches!(result, Err(AppError::InvalidPeriod(_))));
    assert!(db.get_rental("user-1", "book-1").unwrap().is_none());
}

#[test]
fn store_renewal_replaces_record() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let first = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", first).unwrap();

    // Renew a week later for a month: end date recomputed from "now"
    let later = first + Duration::days(7);
    let (_, receipt) = store.rent_at("user-1", "book-1", "1month", later).unwrap();

    let rentals = db.get_user_rentals("user-1").unwrap();
    assert_eq!(rentals.len(), 1);
    assert_eq!(rentals[0].period, "1month");
    assert_eq!(
        receipt.end_date,
        (Utc.with_ymd_and_hms(2024, 4, 8, 0, 0, 0).unwrap()).timestamp()
    );
}

#[test]
fn store_rent_unavailable_book() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let mut book = db.get_book("book-1").unwrap().unwrap();
    book.status = "unavailable".to_string();
    db.update_book(&book).unwrap();

    let result = store.rent("user-1", "book-1", "2weeks");
    assert!(matches!(result, Err(AppError::BookUnavailable(_))));
}

// ========== STORE: ACCESS GATE ==========

#[test]
fn gate_denies_without_entitlement() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    assert!(!store.can_read("user-1", "book-1").unwrap());
    // Unknown user or book is simply "no access", not an error
    assert!(!store.can_read("ghost", "book-1").unwrap());
    assert!(!store.can_read("user-1", "missing").unwrap());
}

#[test]
fn gate_allows_active_rental_denies_expired() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();

    let during = start + Duration::days(13);
    let exactly = start + Duration::days(14);
    let after = start + Duration::days(15);

    assert!(store.can_read_at("user-1", "book-1", during).unwrap());
    // End date must be strictly in the future
    assert!(!store.can_read_at("user-1", "book-1", exactly).unwrap());
    assert!(!store.can_read_at("user-1", "book-1", after).unwrap());
}

#[test]
fn gate_reads_never_mutate() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();

    let after = start + Duration::days(20);
    for _ in 0..3 {
        assert!(!store.can_read_at("user-1", "book-1", after).unwrap());
    }

    // The expired record is still there, untouched
    let rental = db.get_rental("user-1", "book-1").unwrap().unwrap();
    assert_eq!(rental.period, "2weeks");
    assert_eq!(
        rental.end_date,
        (start + Duration::days(14)).timestamp()
    );
}

#[test]
fn gate_purchase_outlives_rental_expiry() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();
    store.purchase("user-1", "book-1").unwrap();

    let long_after = start + Duration::days(365);
    assert!(store.can_read_at("user-1", "book-1", long_after).unwrap());
}

// ========== STORE: EXPIRATION SWEEP ==========

#[test]
fn sweep_emits_expiring_notice_once() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();

    // Two days before the end date: inside the warning window
    let check = start + Duration::days(12);
    assert_eq!(store.check_expirations_at("user-1", check).unwrap(), 1);

    // Re-running with no time passing emits nothing
    assert_eq!(store.check_expirations_at("user-1", check).unwrap(), 0);
    assert_eq!(store.check_expirations_at("user-1", check).unwrap(), 0);

    let notifications = db.get_notifications("user-1").unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("Test Book"));
    assert!(notifications[0].message.contains("expires in 2 days"));
    assert_eq!(notifications[0].kind.as_deref(), Some("expiring"));
    assert_eq!(notifications[0].book_id.as_deref(), Some("book-1"));
}

#[test]
fn sweep_emits_expired_notice() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();

    let check = start + Duration::days(20);
    assert_eq!(store.check_expirations_at("user-1", check).unwrap(), 1);
    assert_eq!(store.check_expirations_at("user-1", check).unwrap(), 0);

    let notifications = db.get_notifications("user-1").unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("expired on 2024-03-15"));
    assert_eq!(notifications[0].kind.as_deref(), Some("expired"));
}

#[test]
fn sweep_expiring_then_expired_emits_both_kinds() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();

    let warning = start + Duration::days(12);
    assert_eq!(store.check_expirations_at("user-1", warning).unwrap(), 1);

    let after_end = start + Duration::days(16);
    assert_eq!(store.check_expirations_at("user-1", after_end).unwrap(), 1);
    assert_eq!(store.check_expirations_at("user-1", after_end).unwrap(), 0);

    let notifications = db.get_notifications("user-1").unwrap();
    assert_eq!(notifications.len(), 2);
}

#[test]
fn sweep_renewal_resets_notice_dedup() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();

    // First term: expiring notice two days out
    let first_warning = start + Duration::days(13);
    assert_eq!(store.check_expirations_at("user-1", first_warning).unwrap(), 1);

    // Renew before the end; the old notice belongs to the old term
    let renewed = start + Duration::days(14);
    store.rent_at("user-1", "book-1", "2weeks", renewed).unwrap();

    let second_warning = renewed + Duration::days(13);
    assert_eq!(
        store.check_expirations_at("user-1", second_warning).unwrap(),
        1
    );
    assert_eq!(
        store.check_expirations_at("user-1", second_warning).unwrap(),
        0
    );

    assert_eq!(db.get_notifications("user-1").unwrap().len(), 2);
}

#[test]
fn sweep_active_rental_stays_quiet() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "3months", start).unwrap();

    assert_eq!(
        store
            .check_expirations_at("user-1", start + Duration::days(1))
            .unwrap(),
        0
    );
    assert!(db.get_notifications("user-1").unwrap().is_empty());
}

#[test]
fn sweep_all_users() {
    let db = test_db();
    let store = test_store(&db);
    create_user(&db, "user-1", "a@example.com");
    create_user(&db, "user-2", "b@example.com");
    create_user(&db, "user-3", "c@example.com");
    create_book(&db, "book-1", "Shared Book");

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();
    store.rent_at("user-2", "book-1", "2weeks", start).unwrap();
    // user-3 rents for longer and is not due
    store.rent_at("user-3", "book-1", "3months", start).unwrap();

    let check = start + Duration::days(13);
    assert_eq!(store.check_all_rentals_at(check).unwrap(), 2);
    assert_eq!(store.check_all_rentals_at(check).unwrap(), 0);
}

// ========== STORE: USER VIEWS ==========

#[test]
fn user_books_view_classifies_rentals() {
    let db = test_db();
    let store = test_store(&db);
    setup_user_and_book(&db);
    create_book(&db, "book-2", "Owned Book");

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    store.rent_at("user-1", "book-1", "2weeks", start).unwrap();
    store.purchase("user-1", "book-2").unwrap();

    let view = store
        .user_books_at("user-1", start + Duration::days(10))
        .unwrap();

    assert_eq!(view.purchased_books.len(), 1);
    assert_eq!(view.purchased_books[0].title, "Owned Book");

    assert_eq!(view.rented_books.len(), 1);
    let rented = &view.rented_books[0];
    assert_eq!(rented.book.title, "Test Book");
    assert!(!rented.is_expired);
    assert_eq!(rented.days_left, 4);

    // After the end date the same view reports expiry
    let view = store
        .user_books_at("user-1", start + Duration::days(20))
        .unwrap();
    assert!(view.rented_books[0].is_expired);
    assert_eq!(view.rented_books[0].days_left, 0);
}

// ========== STORE: NOTIFICATIONS ==========

#[test]
fn notify_and_mark_read() {
    let db = test_db();
    let store = test_store(&db);
    create_user(&db, "user-1", "reader@example.com");

    let first = store.notify("user-1", "Welcome to the store").unwrap();
    store.notify("user-1", "Sale this weekend").unwrap();

    assert_eq!(store.unread_count("user-1").unwrap(), 2);

    store.mark_notification_read("user-1", &first.id).unwrap();
    assert_eq!(store.unread_count("user-1").unwrap(), 1);

    let result = store.mark_notification_read("user-1", "missing-id");
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn mark_read_rejects_foreign_notification() {
    let db = test_db();
    let store = test_store(&db);
    create_user(&db, "user-1", "a@example.com");
    create_user(&db, "user-2", "b@example.com");

    let notification = store.notify("user-1", "Private notice").unwrap();

    let result = store.mark_notification_read("user-2", &notification.id);
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(store.unread_count("user-1").unwrap(), 1);
}

// ========== AUTH ==========

#[test]
fn auth_create_user_and_login() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    let user = auth
        .create_user("reader@example.com", "password123", "user")
        .unwrap();
    assert_eq!(user.email, "reader@example.com");
    assert_eq!(user.role, "user");

    let (logged_in, token) = auth.login("reader@example.com", "password123").unwrap();
    assert_eq!(logged_in.email, "reader@example.com");
    assert!(!token.is_empty());
}

#[test]
fn auth_email_is_normalized() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    let user = auth.register("Alice@Example.COM", "password123").unwrap();
    assert_eq!(user.email, "alice@example.com");

    assert!(auth.login("alice@example.com", "password123").is_ok());
    assert!(auth.login("ALICE@example.com", "password123").is_ok());
}

#[test]
fn auth_validate_token() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("alice@example.com", "pass1234", "admin")
        .unwrap();
    let (_, token) = auth.login("alice@example.com", "pass1234").unwrap();

    let user = auth.validate_token(&token).unwrap().unwrap();
    assert_eq!(user.email, "alice@example.com");

    assert!(auth.validate_token("invalid_token").unwrap().is_none());
}

#[test]
fn auth_logout() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("bob@example.com", "password", "user")
        .unwrap();
    let (_, token) = auth.login("bob@example.com", "password").unwrap();

    auth.logout(&token).unwrap();
    assert!(auth.validate_token(&token).unwrap().is_none());
}

#[test]
fn auth_registration_disabled() {
    let db = test_db();
    let auth = AuthService::new(db, 30, false);

    let result = auth.register("new@example.com", "password");
    assert!(result.is_err());
}

#[test]
fn auth_invalid_password() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("user@example.com", "correct-horse", "user")
        .unwrap();
    let result = auth.login("user@example.com", "wrong");
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}

#[test]
fn auth_change_password() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("user@example.com", "oldpass", "user")
        .unwrap();
    auth.change_password("user@example.com", "newpass").unwrap();

    assert!(auth.login("user@example.com", "oldpass").is_err());
    assert!(auth.login("user@example.com", "newpass").is_ok());
}

#[test]
fn auth_short_password_rejected() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    let result = auth.create_user("user@example.com", "abc", "user");
    assert!(result.is_err());
}

#[test]
fn auth_invalid_email_rejected() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    assert!(auth.create_user("not-an-email", "password", "user").is_err());
    assert!(auth.create_user("user@nodot", "password", "user").is_err());
    assert!(auth.create_user("", "password", "user").is_err());
}

#[test]
fn auth_is_admin() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    let admin = auth
        .create_user("admin@example.com", "password", "admin")
        .unwrap();
    let user = auth
        .create_user("user@example.com", "password", "user")
        .unwrap();

    assert!(auth.is_admin(&admin));
    assert!(!auth.is_admin(&user));
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Store"

[database]
path = "/tmp/test.db"

[auth]
registration = "disabled"
session_days = 7

[rentals]
warning_window_days = 5
sweep_interval_seconds = 600

[storage]
books_dir = "/tmp/books"
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Store");
    assert!(!config.auth.registration_enabled());
    assert_eq!(config.auth.session_days, 7);
    assert_eq!(config.rentals.warning_window_days, 5);
    assert_eq!(config.rentals.sweep_interval_seconds, 600);
    assert_eq!(
        config.storage.books_dir,
        std::path::PathBuf::from("/tmp/books")
    );
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert!(config.auth.registration_enabled());
    assert_eq!(config.rentals.warning_window_days, 3);
    assert_eq!(config.rentals.sweep_interval_seconds, 0);
}
