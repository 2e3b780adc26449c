/*
 * Orpheus Sound - Signal graph node toolkit
 * Copyright (c) 2025 MACHIKO LAB
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Node Registry - table of node classes available to graph builders
//!
//! Keyed by (namespace, class name, variant, major version). Modules fill it
//! during startup and remove their entries at shutdown; graph builders only
//! query it.

pub mod factory;

pub use factory::*;

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lazy_static::lazy_static;
use thiserror::Error;
use tracing::{info, warn};

use crate::interface::{NodeClassKey, NodeClassMetadata, NodeClassName};
use crate::parameters::DescriptorError;

/// Registry error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Duplicate registration of node class {key}")]
    DuplicateRegistration { key: NodeClassKey },

    #[error("Node class not found: {key}")]
    NotFound { key: NodeClassKey },

    #[error("Incompatible upgrade of {key}: {reason}")]
    IncompatibleUpgrade { key: NodeClassKey, reason: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// Registry result type
pub type RegistryResult<T> = Result<T, RegistryError>;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<NodeRegistry> = Arc::new(NodeRegistry::new());
}

#[derive(Default)]
pub struct NodeRegistry {
    entries: DashMap<NodeClassKey, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by modules loaded into this process.
    pub fn global() -> Arc<NodeRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Register a node class. A second class with the same key is rejected.
    pub fn register(&self, factory: NodeFactory) -> RegistryResult<NodeClassKey> {
        let key = factory.key();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => {
                warn!(%key, "Rejected duplicate node registration");
                Err(RegistryError::DuplicateRegistration { key })
            }
            Entry::Vacant(slot) => {
                info!(%key, version = %factory.node_info().version_string(), "Node class registered");
                slot.insert(factory);
                Ok(key)
            }
        }
    }

    /// Replace a registered class with a newer minor version of itself.
    ///
    /// Returns the replaced factory.
    pub fn upgrade(&self, factory: NodeFactory) -> RegistryResult<NodeFactory> {
        let key = factory.key();
        let mut entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| RegistryError::NotFound { key: key.clone() })?;

        let current = entry.node_info();
        let next = factory.node_info();

        if next.minor_version <= current.minor_version {
            return Err(RegistryError::IncompatibleUpgrade {
                key,
                reason: format!(
                    "version {} does not supersede {}",
                    next.version_string(),
                    current.version_string()
                ),
            });
        }

        if !next.interface.is_compatible_with(&current.interface) {
            return Err(RegistryError::IncompatibleUpgrade {
                key,
                reason: "interface removes or retypes existing vertices, or adds a required input"
                    .to_string(),
            });
        }

        info!(%key, from = %current.version_string(), to = %next.version_string(), "Node class upgraded");
        Ok(std::mem::replace(entry.value_mut(), factory))
    }

    pub fn unregister(&self, key: &NodeClassKey) -> Option<NodeFactory> {
        let removed = self.entries.remove(key).map(|(_, factory)| factory);
        if removed.is_some() {
            info!(%key, "Node class unregistered");
        }
        removed
    }

    pub fn find(&self, key: &NodeClassKey) -> Option<NodeFactory> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Highest major version registered under `class_name`.
    pub fn find_latest(&self, class_name: &NodeClassName) -> Option<NodeFactory> {
        self.entries
            .iter()
            .filter(|entry| &entry.key().class_name == class_name)
            .max_by_key(|entry| entry.key().major_version)
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &NodeClassKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Metadata of every registered class, sorted by key.
    pub fn list(&self) -> Vec<&'static NodeClassMetadata> {
        let mut infos: Vec<&'static NodeClassMetadata> =
            self.entries.iter().map(|entry| entry.value().node_info()).collect();
        infos.sort_by_key(|info| info.key());
        infos
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("classes", &self.len())
            .finish()
    }
}
