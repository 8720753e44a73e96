//! Host registry
//!
//! Address book of peer hosts, keyed by label and kept in registration order.
//! The batch coordinator only ever reads a point-in-time [`snapshot`]; edits
//! made after a snapshot is taken do not affect an in-flight fan-out.
//!
//! [`snapshot`]: HostRegistry::snapshot

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// One peer host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// `host:port` of the peer's node service
    pub address: String,
    /// Unique label
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HostRecord {
    pub fn new(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("host '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("host '{0}' not found")]
    NotFound(String),
}

/// Ordered set of host records
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: RwLock<Vec<HostRecord>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry, e.g. from `[[hosts]]` in the config file
    pub fn from_records(records: impl IntoIterator<Item = HostRecord>) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for record in records {
            registry.register(record)?;
        }
        Ok(registry)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<HostRecord>> {
        self.hosts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<HostRecord>> {
        self.hosts.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, record: HostRecord) -> Result<(), RegistryError> {
        let mut hosts = self.write();
        if hosts.iter().any(|h| h.label == record.label) {
            return Err(RegistryError::AlreadyRegistered(record.label));
        }
        tracing::info!(host = %record.label, address = %record.address, "host registered");
        hosts.push(record);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Result<HostRecord, RegistryError> {
        self.read()
            .iter()
            .find(|h| h.label == label)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(label.to_string()))
    }

    /// Replace the record with the same label, keeping its position
    pub fn update(&self, record: HostRecord) -> Result<(), RegistryError> {
        let mut hosts = self.write();
        let slot = hosts
            .iter_mut()
            .find(|h| h.label == record.label)
            .ok_or_else(|| RegistryError::NotFound(record.label.clone()))?;
        *slot = record;
        Ok(())
    }

    pub fn remove(&self, label: &str) -> Result<HostRecord, RegistryError> {
        let mut hosts = self.write();
        let index = hosts
            .iter()
            .position(|h| h.label == label)
            .ok_or_else(|| RegistryError::NotFound(label.to_string()))?;
        tracing::info!(host = %label, "host removed");
        Ok(hosts.remove(index))
    }

    /// Copy of every record in registration order
    pub fn snapshot(&self) -> Vec<HostRecord> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
