pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod types;
pub mod users;

pub use config::AppConfig;
pub use db::Database;
pub use error::TrackerError;
pub use store::{RecordStore, Scope, UndecodableRecord};
pub use types::{LearningRecord, NewRecord, RecordPatch, Topic};
pub use users::{User, UserStore};
