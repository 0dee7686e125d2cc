//! WebSocket connection handling: state, registry, pumps and the upgrade path.

pub mod connection;
pub mod registry;
mod session;
pub mod upgrade;
