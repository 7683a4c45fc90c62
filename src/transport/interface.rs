//! Multicast interface selection.
//!
//! Discovery has to pick the local IPv4 interface it joins the group on and
//! sends from. The default takes the first non-loopback IPv4 address the
//! host reports; `ECHONET_MULTICAST_IF` overrides it, and
//! [`FixedInterface`] pins it outright (tests, multi-homed hosts).

use std::net::{IpAddr, Ipv4Addr};

/// Environment variable overriding the multicast interface
pub const MULTICAST_IF_ENV: &str = "ECHONET_MULTICAST_IF";

/// Picks the interface discovery joins and sends on
pub trait InterfaceSelector: Send + Sync {
    /// The interface address, `0.0.0.0` when nothing suitable exists
    fn select(&self) -> Ipv4Addr;
}

/// Always the given address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterface(pub Ipv4Addr);

impl InterfaceSelector for FixedInterface {
    fn select(&self) -> Ipv4Addr {
        self.0
    }
}

/// First non-loopback IPv4 interface reported by the host
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstNonLoopback;

impl InterfaceSelector for FirstNonLoopback {
    fn select(&self) -> Ipv4Addr {
        if let Ok(var) = std::env::var(MULTICAST_IF_ENV) {
            if let Ok(addr) = var.parse::<Ipv4Addr>() {
                log::debug!("Using {} override: {}", MULTICAST_IF_ENV, addr);
                return addr;
            }
            log::warn!("Ignoring unparsable {}={:?}", MULTICAST_IF_ENV, var);
        }

        let interfaces = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                log::warn!("Failed to list network interfaces: {}", e);
                return Ipv4Addr::UNSPECIFIED;
            }
        };

        let selected = first_non_loopback_v4(
            interfaces
                .iter()
                .map(|iface| (iface.ip(), iface.is_loopback())),
        );
        log::debug!("Selected multicast interface {}", selected);
        selected
    }
}

/// First IPv4 address whose interface is not loopback, or `0.0.0.0`
pub fn first_non_loopback_v4<I>(candidates: I) -> Ipv4Addr
where
    I: IntoIterator<Item = (IpAddr, bool)>,
{
    candidates
        .into_iter()
        .find_map(|(addr, is_loopback)| match addr {
            IpAddr::V4(v4) if !is_loopback && !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .unwrap_or(Ipv4Addr::UNSPECIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_loopback_and_v6() {
        let candidates = vec![
            (IpAddr::V4(Ipv4Addr::LOCALHOST), true),
            ("fe80::1".parse().unwrap(), false),
            (IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), false),
            (IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), false),
        ];
        assert_eq!(
            first_non_loopback_v4(candidates),
            Ipv4Addr::new(192, 168, 1, 20)
        );
    }

    #[test]
    fn test_falls_back_to_unspecified() {
        let candidates = vec![(IpAddr::V4(Ipv4Addr::LOCALHOST), true)];
        assert_eq!(first_non_loopback_v4(candidates), Ipv4Addr::UNSPECIFIED);
        assert_eq!(
            first_non_loopback_v4(Vec::<(IpAddr, bool)>::new()),
            Ipv4Addr::UNSPECIFIED
        );
    }

    #[test]
    fn test_fixed_interface() {
        let selector = FixedInterface(Ipv4Addr::new(192, 168, 0, 2));
        assert_eq!(selector.select(), Ipv4Addr::new(192, 168, 0, 2));
    }
}
