//! Endpoint configuration shared by both the client and server binaries.
//!
//! Mirrors §3 "Endpoint configuration" and §6's CLI surface: tunnel IP, CIDR
//! network, shared password, connect/listen timeout, TUN interface name,
//! and the persist flag. Validated eagerly so bad input is a configuration
//! error (§7), never something discovered mid-run.

use std::net::Ipv4Addr;
use std::time::Duration;

use ipnet::Ipv4Net;

use crate::error::{Error, Result};

/// Tunnel address, network, and transport parameters common to both ends.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// This endpoint's own tunnel IP.
    pub ip: Ipv4Addr,
    /// The CIDR network both peers' tunnel IPs live in.
    pub network: Ipv4Net,
    /// Shared secret the transport's cipher keys are derived from.
    pub password: String,
    /// Dial timeout (client) or accept idle timeout (server, unused by TCP
    /// accept itself but threaded through for symmetry with the original's
    /// single `timeout` field).
    pub timeout: Duration,
    /// Requested TUN interface name; empty lets the kernel choose.
    pub name: String,
    /// Whether the TUN interface should survive process exit.
    pub persist: bool,
}

impl EndpointConfig {
    /// True if `addr` is a plausible tunnel peer: within `network` and not
    /// this endpoint's own address.
    pub fn is_foreign_member(&self, addr: Ipv4Addr) -> bool {
        addr != self.ip && self.network.contains(&addr)
    }
}

/// Parses `--ip CIDR` (e.g. `172.18.0.2/24`) into the endpoint's own address
/// and the network it belongs to.
pub fn parse_cidr(s: &str) -> Result<(Ipv4Addr, Ipv4Net)> {
    let net: Ipv4Net = s
        .parse()
        .map_err(|e| Error::Config(format!("invalid CIDR {s:?}: {e}")))?;
    Ok((net.addr(), net))
}

/// Parses a duration given as a bare integer (seconds) or a number suffixed
/// with `ms`, `s`, `m`, or `h` (e.g. `"30s"`, `"500ms"`). No external crate
/// provides this in the teacher's dependency stack, so it is hand-rolled
/// here rather than imported.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let (digits, suffix) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    };
    if digits.is_empty() {
        return Err(format!("invalid duration {s:?}: no digits"));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {s:?}: not a number"))?;
    let duration = match suffix {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        other => return Err(format!("invalid duration suffix {other:?}")),
    };
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cidr_into_addr_and_network() {
        let (ip, net) = parse_cidr("172.18.0.2/24").unwrap();
        assert_eq!(ip, Ipv4Addr::new(172, 18, 0, 2));
        assert!(net.contains(&Ipv4Addr::new(172, 18, 0, 1)));
        assert!(!net.contains(&Ipv4Addr::new(172, 19, 0, 1)));
    }

    #[test]
    fn rejects_malformed_cidr() {
        assert!(parse_cidr("not-a-cidr").is_err());
    }

    #[test]
    fn is_foreign_member_excludes_self_and_outside_network() {
        let (ip, net) = parse_cidr("172.18.0.1/24").unwrap();
        let cfg = EndpointConfig {
            ip,
            network: net,
            password: String::new(),
            timeout: Duration::from_secs(30),
            name: String::new(),
            persist: false,
        };
        assert!(!cfg.is_foreign_member(ip));
        assert!(cfg.is_foreign_member(Ipv4Addr::new(172, 18, 0, 2)));
        assert!(!cfg.is_foreign_member(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn parses_plain_and_suffixed_durations() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("abc").is_err());
    }
}
