//! Client side of the device bridge: the channel client used by short-lived
//! client processes and the connection supervisor that keeps a durable
//! logical connection alive across host restarts.

pub mod client;
pub mod supervisor;

pub use client::{ConnectionEvent, HostClient};
pub use supervisor::{ConnectionState, Supervisor, SupervisorConfig};
