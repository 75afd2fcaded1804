//! Free-port discovery on the loopback interface

use std::net::{Ipv4Addr, TcpListener};

use crate::error::{ScenarioError, ScenarioResult};

/// Ask the OS for an ephemeral loopback port and release it straight away.
///
/// The listener is dropped before returning so the target process can bind the
/// port. Another process may claim it in between; callers running many
/// scenarios in parallel on one host should expect occasional bind failures.
pub fn allocate_port() -> ScenarioResult<u16> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(ScenarioError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(ScenarioError::PortAllocation)?
        .port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_port() {
        let port1 = allocate_port().unwrap();
        let port2 = allocate_port().unwrap();

        assert!(port1 > 1024);
        assert!(port2 > 1024);
    }

    #[test]
    fn test_allocated_port_is_released() {
        let port = allocate_port().unwrap();
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).expect("port should be bindable again");
    }
}
