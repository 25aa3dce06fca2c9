//! `gate`: a point-to-multipoint IP-layer tunnel. A server terminates many
//! client TCP connections and forwards IPv4 datagrams between all
//! participants as if they shared one private subnet, each endpoint
//! presenting the traffic to its host via a TUN device.
//!
//! Module map, leaves first (see SPEC_FULL.md §2):
//! - [`frame`] — zero-copy IPv4 frame view and control-frame synthesis (A)
//! - [`scanner`] — length-prefixed frame scanner (B)
//! - [`tun`] — raw TUN device acquisition (C)
//! - [`crypto`] / [`transport`] — encrypted, compressed framed transport (D, E)
//! - [`client`] — the client endpoint (F)
//! - [`server`] — the server endpoint: listener, session, router, TUN pump (G)

pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod logging;
pub mod scanner;
pub mod server;
pub mod transport;
pub mod tun;

pub use error::{Error, Result};
