//! Adapters implementing the driven ports.

pub mod memory;

pub use memory::{
    InMemoryDeviceRegistry, InMemoryTrustStore, RegisteredDevice, RegistrySnapshot, StaticTokens,
    TrustSnapshot,
};
