//! HTTP request handlers.

use crate::catalog::{self, Book, BookFilter, PriceTiers};
use crate::db::{self, Notification, User, timestamp_to_datetime};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::store::UserBooks;
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, Response},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

// ============================================================================
// WEB PAGES
// ============================================================================

/// Index page (simple HTML).
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let book_count = state.book_count();
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 2rem auto; padding: 0 1rem; }}
        h1 {{ color: #333; }}
        a {{ color: #0066cc; }}
        .stats {{ background: #f5f5f5; padding: 1rem; border-radius: 8px; margin: 1rem 0; }}
        code {{ background: #e8e8e8; padding: 0.2rem 0.4rem; border-radius: 4px; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <div class="stats">
        <p><strong>{book_count}</strong> books in the catalog</p>
    </div>
    <h2>API</h2>
    <ul>
        <li><a href="/api/books">Catalog (JSON)</a></li>
        <li><code>POST /api/auth/register</code></li>
        <li><code>POST /api/auth/login</code></li>
    </ul>
</body>
</html>"#,
        title = state.config.server.title,
        book_count = book_count,
    );

    Html(html)
}

// ============================================================================
// CATALOG HANDLERS
// ============================================================================

/// Catalog listing response.
#[derive(Serialize)]
pub struct BookListResponse {
    count: usize,
    data: Vec<Book>,
}

/// List books, optionally filtered by category, author, year and status.
pub async fn list_books(
    State(state): State<AppState>,
    Query(filter): Query<BookFilter>,
) -> Result<Json<BookListResponse>> {
    let books = state.db.list_books(&filter)?;

    Ok(Json(BookListResponse {
        count: books.len(),
        data: books,
    }))
}

/// Book metadata (JSON).
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Book>> {
    let book = state
        .db
        .get_book(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;

    Ok(Json(book))
}

/// Book creation request.
#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    title: String,
    author: String,
    category: String,
    year: i32,
    description: String,
    cover_url: String,
    pdf_path: String,
    price: PriceTiers,
    status: Option<String>,
}

/// Create a new book (admin only).
pub async fn create_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>)> {
    let user = get_authenticated_user(&state, &headers).await?;
    require_admin(&state, &user)?;

    if req.title.trim().is_empty() || req.author.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and author are required".to_string(),
        ));
    }

    let status = req.status.unwrap_or_else(|| catalog::STATUS_AVAILABLE.to_string());
    if !catalog::valid_status(&status) {
        return Err(AppError::Validation(format!(
            "Status must be 'available' or 'unavailable', got '{}'",
            status
        )));
    }

    let now = db::now_timestamp();
    let book = Book {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title,
        author: req.author,
        category: req.category,
        year: req.year,
        description: req.description,
        cover_url: req.cover_url,
        pdf_path: req.pdf_path,
        price: req.price,
        status,
        created_at: now,
        updated_at: now,
    };

    state.db.create_book(&book)?;
    tracing::info!(book = %book.id, title = %book.title, "Book created");

    Ok((StatusCode::CREATED, Json(book)))
}

/// Book update request. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateBookRequest {
    title: Option<String>,
    author: Option<String>,
    category: Option<String>,
    year: Option<i32>,
    description: Option<String>,
    cover_url: Option<String>,
    pdf_path: Option<String>,
    price: Option<PriceTiers>,
    status: Option<String>,
}

/// Update a book (admin only).
pub async fn update_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<Json<Book>> {
    let user = get_authenticated_user(&state, &headers).await?;
    require_admin(&state, &user)?;

    let mut book = state
        .db
        .get_book(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;

    if let Some(status) = &req.status
        && !catalog::valid_status(status)
    {
        return Err(AppError::Validation(format!(
            "Status must be 'available' or 'unavailable', got '{}'",
            status
        )));
    }

    if let Some(title) = req.title {
        book.title = title;
    }
    if let Some(author) = req.author {
        book.author = author;
    }
    if let Some(category) = req.category {
        book.category = category;
    }
    if let Some(year) = req.year {
        book.year = year;
    }
    if let Some(description) = req.description {
        book.description = description;
    }
    if let Some(cover_url) = req.cover_url {
        book.cover_url = cover_url;
    }
    if let Some(pdf_path) = req.pdf_path {
        book.pdf_path = pdf_path;
    }
    if let Some(price) = req.price {
        book.price = price;
    }
    if let Some(status) = req.status {
        book.status = status;
    }
    book.updated_at = db::now_timestamp();

    state.db.update_book(&book)?;
    Ok(Json(book))
}

/// Delete a book (admin only). Removes the PDF file if present;
/// entitlement rows cascade in the database.
pub async fn delete_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;
    require_admin(&state, &user)?;

    let book = state
        .db
        .get_book(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;

    let pdf = state.pdf_path(&book);
    if pdf.exists() {
        let _ = std::fs::remove_file(&pdf);
    }

    state.db.delete_book(&id)?;
    tracing::info!(book = %id, "Book deleted");

    Ok(StatusCode::OK)
}

// ============================================================================
// PURCHASE / RENTAL HANDLERS
// ============================================================================

/// Purchase response.
#[derive(Serialize)]
pub struct PurchaseResponse {
    book: Book,
    price: u32,
}

/// Purchase a book.
pub async fn purchase_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PurchaseResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let (book, price) = state.store.purchase(&user.id, &id)?;

    Ok(Json(PurchaseResponse { book, price }))
}

/// Rent request.
#[derive(Debug, Deserialize)]
pub struct RentRequest {
    period: String,
}

/// Rent response.
#[derive(Serialize)]
pub struct RentResponse {
    book: Book,
    period: String,
    end_date: String,
    price: u32,
}

/// Rent a book, or renew an existing rental.
pub async fn rent_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RentRequest>,
) -> Result<Json<RentResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let (book, receipt) = state.store.rent(&user.id, &id, &req.period)?;

    Ok(Json(RentResponse {
        book,
        period: receipt.period,
        end_date: timestamp_to_datetime(receipt.end_date).to_rfc3339(),
        price: receipt.price,
    }))
}

/// Stream a book's PDF to an entitled user.
pub async fn read_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let user = get_authenticated_user(&state, &headers).await?;

    let book = state
        .db
        .get_book(&id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;

    if !state.store.can_read(&user.id, &id)? {
        return Err(AppError::Forbidden(
            "You do not have access to this book".to_string(),
        ));
    }

    let path = state.pdf_path(&book);
    if !path.exists() {
        return Err(AppError::NotFound(format!(
            "PDF file not found for book: {}",
            id
        )));
    }

    let file = tokio::fs::File::open(&path).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("book.pdf");
    let content_disposition = format!("inline; filename=\"{}\"", filename);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .body(body)
        .unwrap_or_else(|_| Response::default()))
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    user_id: String,
    email: String,
    role: String,
}

/// Register request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, token) = state.auth.login(&req.email, &req.password)?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        email: user.email,
        role: user.role,
    }))
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>)> {
    let _user = state.auth.register(&req.email, &req.password)?;
    let (user, token) = state.auth.login(&req.email, &req.password)?;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user_id: user.id,
            email: user.email,
            role: user.role,
        }),
    ))
}

/// Auth logout.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(StatusCode::OK)
}

/// Profile response: the user with populated entitlements.
#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    user: User,
    #[serde(flatten)]
    books: UserBooks,
    notifications: Vec<Notification>,
}

/// Get current user profile with purchased/rented books and notifications.
pub async fn auth_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;

    let books = state.store.user_books(&user.id)?;
    let notifications = state.store.notifications(&user.id)?;

    Ok(Json(ProfileResponse {
        user,
        books,
        notifications,
    }))
}

// ============================================================================
// USER LIBRARY API
// ============================================================================

/// Get the authenticated user's purchased and rented books.
pub async fn user_books(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserBooks>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.store.user_books(&user.id)?))
}

/// Get the authenticated user's notifications, newest first.
pub async fn user_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(state.store.notifications(&user.id)?))
}

/// Mark a notification as read.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = get_authenticated_user(&state, &headers).await?;
    state.store.mark_notification_read(&user.id, &id)?;
    Ok(StatusCode::OK)
}

/// Unread count response.
#[derive(Serialize)]
pub struct UnreadResponse {
    unread: i64,
}

/// Count of unread notifications.
pub async fn unread_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UnreadResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    let unread = state.store.unread_count(&user.id)?;
    Ok(Json(UnreadResponse { unread }))
}

// ============================================================================
// ADMIN API
// ============================================================================

/// Sweep response.
#[derive(Serialize)]
pub struct SweepResponse {
    notifications_sent: usize,
}

/// Run the rental expiration sweep across all users (admin only).
pub async fn check_rentals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>> {
    let user = get_authenticated_user(&state, &headers).await?;
    require_admin(&state, &user)?;

    let notifications_sent = state.store.check_all_rentals()?;
    Ok(Json(SweepResponse { notifications_sent }))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Get authenticated user from token.
async fn get_authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state
        .auth
        .validate_token(&token)?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}

/// Require the admin role.
fn require_admin(state: &AppState, user: &User) -> Result<()> {
    if !state.auth.is_admin(user) {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(())
}
