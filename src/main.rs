//! bookstore-rs server entry point.

use bookstore_rs::{
    auth::AuthService,
    config::{Cli, Command, Config, UserCommand},
    db::Database,
    server,
    store::StoreService,
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Sweep) => cmd_sweep(&config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => {
            // Default: start server
            cmd_serve(config, None).await
        }
    }
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    // Write default config
    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    // Initialize database
    let config = Config::default();
    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: bookstore-rs user add admin@example.com --role admin");

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(
        db,
        config.auth.session_days,
        config.auth.registration_enabled(),
    );

    match action {
        UserCommand::Add {
            email,
            password,
            role,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.create_user(&email, &password, &role)?;
            println!(
                "Created user: {} (role: {}, id: {})",
                user.email, user.role, user.id
            );
        }

        UserCommand::Del { email } => {
            if auth.delete_user(&email)? {
                println!("Deleted user: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<30} {:<10} {:<36} LAST LOGIN", "EMAIL", "ROLE", "ID");
                println!("{}", "-".repeat(90));
                for user in users {
                    let last_login = user
                        .last_login
                        .map(|ts| {
                            chrono::DateTime::from_timestamp(ts, 0)
                                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                                .unwrap_or_else(|| "unknown".to_string())
                        })
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<30} {:<10} {:<36} {}",
                        user.email, user.role, user.id, last_login
                    );
                }
            }
        }

        UserCommand::Passwd { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.change_password(&email, &password)? {
                println!("Password changed for: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }
    }

    Ok(())
}

/// Run the rental expiration sweep once.
async fn cmd_sweep(config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let store = StoreService::new(db, config.rentals.warning_window_days);

    let sent = store.check_all_rentals()?;
    println!("Rental check complete. {} notifications sent.", sent);

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    // Override bind address if specified
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookstore_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Open database
    let db = Database::open(&config.database.path)?;

    // Create services
    let auth = AuthService::new(
        db.clone(),
        config.auth.session_days,
        config.auth.registration_enabled(),
    );
    let store = StoreService::new(db.clone(), config.rentals.warning_window_days);

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        "Starting bookstore-rs server"
    );

    // Create application state
    let state = server::AppState::new(config.clone(), db.clone(), auth, store);

    // Start background rental sweep task if enabled
    if config.rentals.sweep_interval_seconds > 0 {
        let state_clone = state.clone();
        let interval = Duration::from_secs(config.rentals.sweep_interval_seconds);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                tracing::debug!("Running scheduled rental expiration sweep");

                if let Err(e) = state_clone.store.check_all_rentals() {
                    tracing::warn!(error = %e, "Scheduled rental sweep failed");
                }
            }
        });
    }

    // Cleanup expired sessions on startup
    if let Ok(removed) = db.cleanup_expired_sessions()
        && removed > 0
    {
        tracing::info!(removed = removed, "Cleaned up expired sessions");
    }

    // Create router
    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
