//! Long-lived bridge host: the service listener that accepts onboarding
//! commands, the registry that enforces at-most-once materialization, and
//! the durable per-category store that makes onboarding survive restarts.

pub mod bus;
pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;

pub use config::HostConfig;
pub use lifecycle::socket_path;
pub use registry::OnboardingRegistry;
pub use server::Listener;
