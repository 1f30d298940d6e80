//! In-memory adapters for tests and local development.
//!
//! Not for production: state is lost on restart.

mod gateway;
mod license_store;
mod notifier;
mod user_directory;

pub use gateway::InMemoryGateway;
pub use license_store::InMemoryLicenseStore;
pub use notifier::{RecordingNotifier, SentNotification};
pub use user_directory::InMemoryUserDirectory;
