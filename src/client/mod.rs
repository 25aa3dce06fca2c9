//! The client endpoint (F): single TCP connection to the server (§4.2).

pub mod client;

pub use client::Client;
