//! Shared types for the askdb question-to-SQL service.

mod api;
mod chat;
mod session;

pub use api::*;
pub use chat::*;
pub use session::*;
