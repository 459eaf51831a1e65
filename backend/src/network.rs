//! Local network interface lookup.

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to list network interfaces: {0}")]
    Interfaces(String),

    #[error("Only IPv4 networks can be scanned")]
    Ipv6Unsupported,

    #[error("No usable local IPv4 address found")]
    NoLocalAddress,
}

/// The machine's own IPv4 address on a non-loopback interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNetwork {
    pub interface: String,
    pub address: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
}

/// Find the first non-loopback, non-link-local IPv4 address.
///
/// Fails with `Ipv6Unsupported` when the only usable addresses are IPv6.
pub fn local_ipv4_network() -> Result<LocalNetwork, NetworkError> {
    let interfaces =
        NetworkInterface::show().map_err(|e| NetworkError::Interfaces(e.to_string()))?;

    let addresses = interfaces.into_iter().flat_map(|iface| {
        let name = iface.name;
        iface.addr.into_iter().map(move |addr| match addr {
            Addr::V4(v4) => (name.clone(), IpAddr::V4(v4.ip), v4.netmask.map(IpAddr::V4)),
            Addr::V6(v6) => (name.clone(), IpAddr::V6(v6.ip), v6.netmask.map(IpAddr::V6)),
        })
    });

    let local = select_local(addresses)?;
    debug!(
        interface = %local.interface,
        address = %local.address,
        "Selected local network"
    );
    Ok(local)
}

fn select_local(
    addresses: impl IntoIterator<Item = (String, IpAddr, Option<IpAddr>)>,
) -> Result<LocalNetwork, NetworkError> {
    let mut saw_ipv6 = false;

    for (interface, ip, netmask) in addresses {
        match ip {
            IpAddr::V4(address) if !address.is_loopback() && !address.is_link_local() => {
                let netmask = match netmask {
                    Some(IpAddr::V4(mask)) => Some(mask),
                    _ => None,
                };
                return Ok(LocalNetwork {
                    interface,
                    address,
                    netmask,
                });
            }
            IpAddr::V6(address) if !address.is_loopback() => saw_ipv6 = true,
            _ => {}
        }
    }

    if saw_ipv6 {
        Err(NetworkError::Ipv6Unsupported)
    } else {
        Err(NetworkError::NoLocalAddress)
    }
}
