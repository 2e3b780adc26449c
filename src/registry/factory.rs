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

//! Node Factory - builds operators for one node class
//!
//! The registry stores factories, not node objects. A factory is the class's
//! static metadata plus a closure that turns build parameters into an operator.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::interface::{NodeClassKey, NodeClassMetadata, VertexInterface};
use crate::parameters::DescriptorError;
use crate::processing::{BuildErrors, BuildOperatorParams, Operator, OperatorClass};

/// Factory closure signature
pub type CreateOperatorFn =
    dyn Fn(&BuildOperatorParams) -> Result<Box<dyn Operator>, BuildErrors> + Send + Sync;

#[derive(Clone)]
pub struct NodeFactory {
    info: &'static NodeClassMetadata,
    create: Arc<CreateOperatorFn>,
}

impl NodeFactory {
    /// Wrap an arbitrary construction closure.
    pub fn new<F>(info: &'static NodeClassMetadata, create: F) -> Self
    where
        F: Fn(&BuildOperatorParams) -> Result<Box<dyn Operator>, BuildErrors> + Send + Sync + 'static,
    {
        Self {
            info,
            create: Arc::new(create),
        }
    }

    /// Factory for a class with a static interface. Fails if its descriptors are malformed.
    pub fn of<T: OperatorClass>() -> Result<Self, DescriptorError> {
        let info = T::class_info()?;
        Ok(Self::new(info, |params| {
            T::create_operator(params).map(|operator| Box::new(operator) as Box<dyn Operator>)
        }))
    }

    pub fn node_info(&self) -> &'static NodeClassMetadata {
        self.info
    }

    /// The class interface. Every call returns the same reference.
    pub fn declare(&self) -> &'static VertexInterface {
        &self.info.interface
    }

    pub fn key(&self) -> NodeClassKey {
        self.info.key()
    }

    pub fn create(&self, params: &BuildOperatorParams) -> Result<Box<dyn Operator>, BuildErrors> {
        for (name, _) in params.inputs.iter() {
            if self.info.interface.get_input(name).is_err() {
                warn!(class = %self.info.class_name, vertex = name, "Ignoring bound input the interface does not declare");
            }
        }

        match (self.create)(params) {
            Ok(operator) => {
                debug!(class = %self.info.class_name, version = %self.info.version_string(), "Operator created");
                Ok(operator)
            }
            Err(errors) => {
                warn!(class = %self.info.class_name, count = errors.len(), "Operator build failed: {}", errors);
                Err(errors)
            }
        }
    }
}

impl fmt::Debug for NodeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFactory")
            .field("class_name", &self.info.class_name)
            .field("version", &self.info.version_string())
            .finish()
    }
}
