//! Continuation sessions for stateless pagination
//!
//! A caller receives an opaque token on the first chunked read and presents it
//! on later calls to resume. Tokens expire after a fixed TTL.

pub mod models;
pub mod store;
pub mod token;

pub use models::{PaginationRecord, Position, SessionUpdate, Totals};
pub use store::{SessionConfig, SessionStats, SessionStore};
pub use token::TokenCodec;
