//! The server endpoint (G): listener, session, router, and TUN pump (§4.3).

pub mod router;
pub mod server;
pub mod session;

pub use server::Server;
