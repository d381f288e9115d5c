//! Sondas ICMP Echo e UDP para descobrir como um NAT trata sessões.
//!
//! O cliente dispara rajadas de sondas (opcionalmente variando identifier,
//! sequence ou destino) e o servidor responde, podendo responder também a
//! partir de uma segunda porta local para revelar se o NAT exige a tupla
//! original.

pub mod args;
pub mod checksum;
pub mod client;
pub mod error;
pub mod icmp;
pub mod probe;
pub mod server;
pub mod sweep;
pub mod transport;

pub use error::{ProbeError, Result};
