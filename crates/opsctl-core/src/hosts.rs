//! Ad-hoc host list validation.
//!
//! Callers may override an action's inventory with an explicit host list.
//! Only dotted-quad IPv4 addresses are accepted; anything else is dropped.

use std::net::Ipv4Addr;

use crate::error::{OpsError, Result};

/// Keep the entries of `candidates` that parse as IPv4 addresses, in order.
///
/// Returns `NoValidHosts` if nothing survives, so an override never silently
/// widens to the default inventory.
pub fn valid_ipv4_hosts<S: AsRef<str>>(candidates: &[S]) -> Result<Vec<String>> {
    let hosts: Vec<String> = candidates
        .iter()
        .map(|h| h.as_ref().trim())
        .filter(|h| h.parse::<Ipv4Addr>().is_ok())
        .map(str::to_string)
        .collect();
    if hosts.is_empty() {
        return Err(OpsError::NoValidHosts);
    }
    Ok(hosts)
}
