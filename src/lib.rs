pub mod config;
pub mod error;
pub mod migration;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

pub use error::{AppError, AppResult};
pub use models::preference_document::{AppPreferences, PreferenceDocument, TypeChannels};
pub use schema::{Channel, EmailCadence, PreferenceSchema};
