pub mod admin_handlers;
pub mod auth_handlers;
pub mod pipeline_handlers;

pub use admin_handlers::*;
pub use auth_handlers::*;
pub use pipeline_handlers::*;
