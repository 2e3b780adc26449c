pub mod parameters;
pub mod interface;
pub mod data;
pub mod processing;
pub mod registry;
pub mod module;
pub mod nodes;
pub mod graph;
pub mod config;
pub mod errors;

pub use config::{ConfigError, EngineConfig};
pub use data::{
    AnyDataReference, AudioBuffer, DataAccess, DataReadReference, DataReferenceCollection, DataReferenceError,
    DataValue, DataWriteReference,
};
pub use errors::{EngineError, EngineResult};
pub use graph::{Connection, ExecutableGraph, GraphBuilder, GraphError, NodeBuildFailure};
pub use interface::{NodeClassKey, NodeClassMetadata, NodeClassName, VertexInterface, VertexNotFound};
pub use module::{ModuleManager, NodeExtModule, OrpheusSoundModule, SoundModule};
pub use nodes::{AudioAddOperator, TutorialAddOperator};
pub use parameters::{DataType, DescriptorError, Literal, ParameterDescriptor};
pub use processing::{BuildError, BuildErrors, BuildOperatorParams, Operator, OperatorClass, OperatorSettings};
pub use registry::{NodeFactory, NodeRegistry, RegistryError, RegistryResult};
