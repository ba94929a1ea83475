//! Core runtime for Switchyard
//!
//! Agents own an inbox and a handler table, the [`MessageBus`] routes messages
//! between them by id, role or broadcast, and [`MultiAgentSystem`] creates and
//! runs a role topology around a [`CoordinatorAgent`].

pub mod agent;
pub mod bus;
pub mod coordinator;
pub mod schedule;
pub mod settings;
pub mod system;
pub mod workers;

pub use agent::*;
pub use bus::*;
pub use coordinator::*;
pub use schedule::*;
pub use settings::*;
pub use system::*;
pub use workers::*;

/// Re-export common types
pub use switchyard_types::*;
