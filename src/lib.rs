pub mod curl;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod placeholders;
pub mod storage;

// Re-export the types callers thread through the sync pipeline.
pub use engine::{LookupResult, Session, SyncEngine, SyncResult, TestConnectionResult};
pub use error::{Error, Result};
pub use mapping::SyncContext;
pub use storage::{Integration, IntegrationInput, IntegrationView};
