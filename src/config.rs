use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Digital bookstore server with purchase and rental flows.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookstore-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKSTORE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Run the rental expiration sweep once and exit.
    Sweep,

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Email address.
        email: String,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
        /// User role (admin or user).
        #[arg(short, long, default_value = "user")]
        role: String,
    },

    /// Delete a user.
    Del {
        /// Email of the user to delete.
        email: String,
    },

    /// List all users.
    List,

    /// Change user password.
    Passwd {
        /// Email address.
        email: String,
        /// New password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rental lifecycle configuration.
    #[serde(default)]
    pub rentals: RentalConfig,

    /// Content storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Store title.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_title() -> String {
    "My Bookstore".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/bookstore.db")
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Registration mode: "open", "disabled".
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Session token duration in days.
    #[serde(default = "default_session_days")]
    pub session_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            session_days: default_session_days(),
        }
    }
}

fn default_registration() -> String {
    "open".to_string()
}

fn default_session_days() -> u32 {
    30
}

impl AuthConfig {
    /// Check if registration is enabled.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }
}

/// Rental lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalConfig {
    /// Days before expiry at which a rental counts as expiring soon.
    #[serde(default = "default_warning_window_days")]
    pub warning_window_days: i64,

    /// Interval for the in-process expiration sweep in seconds
    /// (0 to disable; the sweep can also be run externally).
    #[serde(default)]
    pub sweep_interval_seconds: u64,
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            warning_window_days: default_warning_window_days(),
            sweep_interval_seconds: 0,
        }
    }
}

fn default_warning_window_days() -> i64 {
    crate::rental::DEFAULT_WARNING_WINDOW_DAYS
}

/// Content storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the book PDF files.
    #[serde(default = "default_books_dir")]
    pub books_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            books_dir: default_books_dir(),
        }
    }
}

fn default_books_dir() -> PathBuf {
    PathBuf::from("data/books")
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("bookstore-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookstore-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookstore-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookstore-rs configuration

[server]
bind = "0.0.0.0:8080"
title = "My Bookstore"

[database]
# path = "/var/lib/bookstore-rs/bookstore.db"

[auth]
# Registration mode: "open" or "disabled"
registration = "open"
# Session duration in days
session_days = 30

[rentals]
# Days before expiry at which a rental counts as expiring soon
warning_window_days = 3
# In-process sweep interval in seconds (0 to disable; use
# `bookstore-rs sweep` from cron instead if preferred)
sweep_interval_seconds = 0

[storage]
# books_dir = "/var/lib/bookstore-rs/books"
"#
        .to_string()
    }
}
