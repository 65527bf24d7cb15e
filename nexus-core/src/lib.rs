//! Nexus core library — domain types, registry persistence, errors.
//!
//! Public API surface:
//! - [`types`] — target enum, server definitions, sync state, preferences
//! - [`error`] — [`RegistryError`]
//! - [`registry`] — load / save / init / mutations

pub mod error;
pub mod registry;
pub mod types;

pub use error::RegistryError;
pub use types::{
    ConfigFormat, Preferences, Registry, ServerDefinition, ServerId, ServerSource, SyncMode,
    TargetId, TargetSettings, Transport,
};
