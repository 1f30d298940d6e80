//! PostgreSQL adapters - Durable implementations of the storage ports.
//!
//! - `PostgresLicenseStore` - License rows, processed-event ledger, notice claims
//! - `PostgresUserDirectory` - Registration instants from the `users` table

mod license_store;
mod user_directory;

pub use license_store::PostgresLicenseStore;
pub use user_directory::PostgresUserDirectory;
