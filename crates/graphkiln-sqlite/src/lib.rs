//! SQLite metadata backend for graphkiln
//!
//! A file-backed [`MetadataStore`](graphkiln_core::MetadataStore) with full
//! [`RecordFilter`](graphkiln_core::RecordFilter) support, so the planner's
//! shared-reference counting runs as a single indexed query.
//!
//! ## Features
//!
//! - **WAL Mode**: readers never block the single writer
//! - **Migrations**: `schema_migrations` tracks the SQL layout, and the sync
//!   record schema version is stamped into the file on first open
//! - **Thread Safety**: `Arc<Mutex<Connection>>`, every call on `spawn_blocking`
//!
//! ## Usage
//!
//! ```toml
//! [backend]
//! type_key = "sqlite"
//!
//! [backend.settings]
//! path = "/var/lib/graphkiln/records.db"
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod schema;
pub mod store;

// Re-exports
pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use factory::{SqliteBackendFactory, SQLITE_BACKEND};
pub use store::SqliteMetadataStore;
