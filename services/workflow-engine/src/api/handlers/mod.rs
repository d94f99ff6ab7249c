pub mod complaints;
pub mod health;
pub mod notifications;
pub mod templates;
pub mod workflows;

pub use complaints::*;
pub use health::*;
pub use notifications::*;
pub use templates::*;
pub use workflows::*;
