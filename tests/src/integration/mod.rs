//! Loopback integration tests.

pub mod harness;

#[cfg(test)]
mod handshake_flows;
#[cfg(test)]
mod lifecycle;
#[cfg(test)]
mod node_flows;
#[cfg(test)]
mod routing_flows;
