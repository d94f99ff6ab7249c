//! Repository contracts for database CRUD operations
//!
//! The engine depends only on these traits; `MemoryStore` and `MongoStore`
//! provide the implementations.

pub mod workflow;
pub mod complaint;
pub mod directory;
pub mod notification;

pub use workflow::{DefinitionFilter, DefinitionStore, InstanceFilter, InstanceStore};
pub use complaint::ComplaintStore;
pub use directory::{DirectoryStore, UserFilter};
pub use notification::NotificationStore;
