//! Shared CLI flags (§6), generalized from the teacher's raw
//! `std::env::args()` binaries to `clap` derive structs.

use std::time::Duration;

use clap::Args;

use crate::config::{parse_cidr, parse_duration, EndpointConfig};
use crate::error::Result;

/// Flags shared by `server` and `client`.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Tunnel address and network, e.g. `172.18.0.1/24`.
    #[arg(long)]
    pub ip: String,

    /// Shared secret the transport's encryption keys are derived from.
    #[arg(long, default_value = "")]
    pub password: String,

    /// Connect/accept timeout, e.g. `30s`, `500ms`.
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub timeout: Duration,

    /// TUN interface name; empty lets the kernel pick one.
    #[arg(long, default_value = "")]
    pub name: String,

    /// Keep the TUN interface alive after this process exits.
    #[arg(long, default_value_t = false)]
    pub persist: bool,

    /// Global log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, default_value = "info")]
    pub loglevel: String,
}

impl CommonArgs {
    pub fn endpoint_config(&self) -> Result<EndpointConfig> {
        let (ip, network) = parse_cidr(&self.ip)?;
        Ok(EndpointConfig {
            ip,
            network,
            password: self.password.clone(),
            timeout: self.timeout,
            name: self.name.clone(),
            persist: self.persist,
        })
    }
}
