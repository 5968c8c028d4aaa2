//! nettune-server: HTTP Surface
//!
//! Routes, bearer auth, per-IP rate limiting, request-size caps and the
//! probe endpoints. Everything behind the routes delegates to the stores
//! and the apply engine; this crate owns no system state of its own.

pub mod handlers;
pub mod info;
pub mod middleware;
pub mod router;
pub mod server;
pub mod state;

pub use router::build_router;
pub use server::serve;
pub use state::AppState;
