//! Host harness graph
//!
//! `GraphBuilder` collects node instances and wiring; `build` turns them into an
//! `ExecutableGraph` whose operators run once per block in dependency order.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::data::{AnyDataReference, DataReadReference, DataReferenceCollection, DataReferenceError, DataValue};
use crate::interface::VertexNotFound;
use crate::parameters::DataType;
use crate::processing::{BuildErrors, BuildOperatorParams, Operator, OperatorSettings};
use crate::registry::NodeFactory;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeBuildFailure {
    pub node: Uuid,
    pub name: String,
    pub errors: BuildErrors,
}

impl fmt::Display for NodeBuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({}): {}", self.name, self.node, self.errors)
    }
}

fn describe_failures(failures: &[NodeBuildFailure], skipped: &[Uuid]) -> String {
    let details: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
    format!(
        "{} node(s) failed, {} skipped: {}",
        failures.len(),
        skipped.len(),
        details.join(" | ")
    )
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Node not found: {id}")]
    NodeNotFound { id: Uuid },

    #[error("{source} on node {node}")]
    Vertex { node: Uuid, source: VertexNotFound },

    #[error("Type mismatch: cannot connect {source_type} to {target_type}")]
    TypeMismatch {
        source_type: DataType,
        target_type: DataType,
    },

    #[error("Input '{vertex}' on node {node} is already connected")]
    AlreadyConnected { node: Uuid, vertex: String },

    #[error("Circular dependency detected: {nodes:?}")]
    Cycle { nodes: Vec<Uuid> },

    #[error("Graph build failed: {}", describe_failures(.failures, .skipped))]
    Build {
        failures: Vec<NodeBuildFailure>,
        /// 上流の失敗により構築されなかったノード
        skipped: Vec<Uuid>,
    },

    #[error("Output '{vertex}' on node {node}: {source}")]
    Output {
        node: Uuid,
        vertex: String,
        source: DataReferenceError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source_node: Uuid,
    pub source_vertex: String,
    pub target_node: Uuid,
    pub target_vertex: String,
}

#[derive(Debug, Clone)]
struct GraphNode {
    name: String,
    factory: NodeFactory,
    /// ホストが直接バインドした入力
    bindings: DataReferenceCollection,
}

/// 構築前のグラフ
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: HashMap<Uuid, GraphNode>,
    insertion_order: Vec<Uuid>,
    connections: Vec<Connection>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str, factory: NodeFactory) -> Uuid {
        let id = Uuid::new_v4();
        self.nodes.insert(
            id,
            GraphNode {
                name: name.to_string(),
                factory,
                bindings: DataReferenceCollection::new(),
            },
        );
        self.insertion_order.push(id);
        id
    }

    pub fn node_by_name(&self, name: &str) -> Option<Uuid> {
        self.insertion_order
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).map_or(false, |node| node.name == name))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// グラフ外のデータを入力に直接バインドする
    pub fn bind_input(&mut self, node: Uuid, vertex: &str, reference: AnyDataReference) -> Result<(), GraphError> {
        let target_type = self.input_type(node, vertex)?;
        if reference.data_type() != target_type {
            return Err(GraphError::TypeMismatch {
                source_type: reference.data_type(),
                target_type,
            });
        }
        self.ensure_unconnected(node, vertex)?;

        if let Some(graph_node) = self.nodes.get_mut(&node) {
            graph_node.bindings.insert(vertex, reference.as_read());
        }
        Ok(())
    }

    pub fn connect(
        &mut self,
        source_node: Uuid,
        source_vertex: &str,
        target_node: Uuid,
        target_vertex: &str,
    ) -> Result<(), GraphError> {
        let source = self
            .nodes
            .get(&source_node)
            .ok_or(GraphError::NodeNotFound { id: source_node })?;
        let source_type = source
            .factory
            .declare()
            .get_output(source_vertex)
            .map_err(|e| GraphError::Vertex {
                node: source_node,
                source: e,
            })?
            .data_type();

        let target_type = self.input_type(target_node, target_vertex)?;
        if source_type != target_type {
            return Err(GraphError::TypeMismatch {
                source_type,
                target_type,
            });
        }

        // 1つの入力に書き込み元は1つだけ
        self.ensure_unconnected(target_node, target_vertex)?;

        self.connections.push(Connection {
            source_node,
            source_vertex: source_vertex.to_string(),
            target_node,
            target_vertex: target_vertex.to_string(),
        });
        Ok(())
    }

    pub fn disconnect(&mut self, target_node: Uuid, target_vertex: &str) -> bool {
        let initial_len = self.connections.len();
        self.connections
            .retain(|conn| !(conn.target_node == target_node && conn.target_vertex == target_vertex));
        self.connections.len() != initial_len
    }

    fn input_type(&self, node: Uuid, vertex: &str) -> Result<DataType, GraphError> {
        let graph_node = self.nodes.get(&node).ok_or(GraphError::NodeNotFound { id: node })?;
        graph_node
            .factory
            .declare()
            .get_input(vertex)
            .map(|descriptor| descriptor.data_type())
            .map_err(|e| GraphError::Vertex { node, source: e })
    }

    fn ensure_unconnected(&self, node: Uuid, vertex: &str) -> Result<(), GraphError> {
        let connected = self
            .connections
            .iter()
            .any(|conn| conn.target_node == node && conn.target_vertex == vertex);
        let bound = self
            .nodes
            .get(&node)
            .map_or(false, |graph_node| graph_node.bindings.contains(vertex));

        if connected || bound {
            return Err(GraphError::AlreadyConnected {
                node,
                vertex: vertex.to_string(),
            });
        }
        Ok(())
    }

    /// 依存順（上流が先）のノード一覧
    pub fn processing_order(&self) -> Result<Vec<Uuid>, GraphError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for &node_id in &self.insertion_order {
            self.visit_node(node_id, &mut visited, &mut stack, &mut order)?;
        }
        Ok(order)
    }

    fn visit_node(
        &self,
        node_id: Uuid,
        visited: &mut HashSet<Uuid>,
        stack: &mut Vec<Uuid>,
        order: &mut Vec<Uuid>,
    ) -> Result<(), GraphError> {
        if visited.contains(&node_id) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|id| *id == node_id) {
            return Err(GraphError::Cycle {
                nodes: stack[pos..].to_vec(),
            });
        }

        stack.push(node_id);

        let dependencies = self
            .connections
            .iter()
            .filter(|conn| conn.target_node == node_id)
            .map(|conn| conn.source_node);
        for dep_node in dependencies {
            self.visit_node(dep_node, visited, stack, order)?;
        }

        stack.pop();
        visited.insert(node_id);
        order.push(node_id);
        Ok(())
    }

    /// 全ノードのオペレーターを依存順に構築する
    ///
    /// 失敗したノードの下流は構築せず、失敗はまとめて返す。
    pub fn build(&self, settings: OperatorSettings) -> Result<ExecutableGraph, GraphError> {
        let order = self.processing_order()?;

        let mut operators: Vec<Box<dyn Operator>> = Vec::with_capacity(order.len());
        let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(order.len());
        let mut unavailable = HashSet::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        for &node_id in &order {
            let Some(node) = self.nodes.get(&node_id) else {
                return Err(GraphError::NodeNotFound { id: node_id });
            };

            let upstream: Vec<&Connection> = self
                .connections
                .iter()
                .filter(|conn| conn.target_node == node_id)
                .collect();

            if upstream.iter().any(|conn| unavailable.contains(&conn.source_node)) {
                debug!(node = %node_id, name = %node.name, "Skipping node downstream of a failed build");
                unavailable.insert(node_id);
                skipped.push(node_id);
                continue;
            }

            let mut inputs = node.bindings.clone();
            for conn in upstream {
                let Some(&source_index) = index.get(&conn.source_node) else {
                    continue;
                };
                let outputs = operators[source_index].get_outputs();
                if let Some(reference) = outputs.get(&conn.source_vertex) {
                    inputs.insert(&conn.target_vertex, reference.as_read());
                }
            }

            match node.factory.create(&BuildOperatorParams::new(settings, inputs)) {
                Ok(operator) => {
                    index.insert(node_id, operators.len());
                    operators.push(operator);
                }
                Err(errors) => {
                    warn!(node = %node_id, name = %node.name, "Node failed to build: {}", errors);
                    unavailable.insert(node_id);
                    failures.push(NodeBuildFailure {
                        node: node_id,
                        name: node.name.clone(),
                        errors,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(GraphError::Build { failures, skipped });
        }

        info!(nodes = operators.len(), connections = self.connections.len(), "Graph built");
        Ok(ExecutableGraph {
            order,
            operators,
            index,
            settings,
        })
    }
}

/// 構築済みのグラフ。オーディオスレッドへ移動して使う。
pub struct ExecutableGraph {
    order: Vec<Uuid>,
    operators: Vec<Box<dyn Operator>>,
    index: HashMap<Uuid, usize>,
    settings: OperatorSettings,
}

impl ExecutableGraph {
    /// 1ブロック分、全オペレーターを順に実行する
    pub fn execute_block(&mut self) {
        for operator in self.operators.iter_mut() {
            operator.execute();
        }
    }

    pub fn processing_order(&self) -> &[Uuid] {
        &self.order
    }

    pub fn settings(&self) -> OperatorSettings {
        self.settings
    }

    pub fn operator(&self, id: Uuid) -> Option<&dyn Operator> {
        self.index.get(&id).map(|&i| self.operators[i].as_ref())
    }

    pub fn outputs(&self, id: Uuid) -> Option<DataReferenceCollection> {
        self.operator(id).map(|operator| operator.get_outputs())
    }

    pub fn read_output<T: DataValue>(&self, id: Uuid, vertex: &str) -> Result<DataReadReference<T>, GraphError> {
        let outputs = self.outputs(id).ok_or(GraphError::NodeNotFound { id })?;
        outputs.get_read::<T>(vertex).map_err(|e| GraphError::Output {
            node: id,
            vertex: vertex.to_string(),
            source: e,
        })
    }
}

impl fmt::Debug for ExecutableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableGraph")
            .field("order", &self.order)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AudioBuffer, DataWriteReference};
    use crate::nodes::tutorial_add::vertex_names::{INPUT_A, INPUT_B, OUTPUT_SUM};
    use crate::nodes::{AudioAddOperator, TutorialAddOperator};
    use crate::processing::BuildError;

    fn tutorial() -> NodeFactory {
        NodeFactory::of::<TutorialAddOperator>().unwrap()
    }

    fn float(value: f32) -> (DataWriteReference<f32>, AnyDataReference) {
        let writer = DataWriteReference::new(value);
        let reference = AnyDataReference::from_write(&writer);
        (writer, reference)
    }

    #[test]
    fn test_chain_executes_in_dependency_order() {
        let mut builder = GraphBuilder::new();
        // 下流を先に追加しても上流から実行される
        let second = builder.add_node("second", tutorial());
        let first = builder.add_node("first", tutorial());

        let (mut a, a_ref) = float(2.0);
        let (_b, b_ref) = float(3.5);
        let (_c, c_ref) = float(1.0);

        builder.bind_input(first, INPUT_A, a_ref).unwrap();
        builder.bind_input(first, INPUT_B, b_ref).unwrap();
        builder.connect(first, OUTPUT_SUM, second, INPUT_A).unwrap();
        builder.bind_input(second, INPUT_B, c_ref).unwrap();

        let mut graph = builder.build(OperatorSettings::default()).unwrap();
        assert_eq!(graph.processing_order(), &[first, second]);

        let result = graph.read_output::<f32>(second, OUTPUT_SUM).unwrap();
        assert_eq!(result.get(), 6.5);

        a.set(10.0);
        graph.execute_block();
        assert_eq!(result.get(), 14.5);
    }

    #[test]
    fn test_connect_validation() {
        let mut builder = GraphBuilder::new();
        let float_node = builder.add_node("float", tutorial());
        let audio_node = builder.add_node("audio", NodeFactory::of::<AudioAddOperator>().unwrap());
        let other = builder.add_node("other", tutorial());

        assert!(matches!(
            builder.connect(float_node, OUTPUT_SUM, audio_node, "In1"),
            Err(GraphError::TypeMismatch {
                source_type: DataType::Float,
                target_type: DataType::Audio
            })
        ));
        assert!(matches!(
            builder.connect(float_node, "Nope", other, INPUT_A),
            Err(GraphError::Vertex { .. })
        ));
        assert!(matches!(
            builder.connect(Uuid::new_v4(), OUTPUT_SUM, other, INPUT_A),
            Err(GraphError::NodeNotFound { .. })
        ));

        builder.connect(float_node, OUTPUT_SUM, other, INPUT_A).unwrap();
        assert!(matches!(
            builder.connect(float_node, OUTPUT_SUM, other, INPUT_A),
            Err(GraphError::AlreadyConnected { .. })
        ));

        let (_w, reference) = float(1.0);
        assert!(matches!(
            builder.bind_input(other, INPUT_A, reference),
            Err(GraphError::AlreadyConnected { .. })
        ));

        assert!(builder.disconnect(other, INPUT_A));
        assert!(!builder.disconnect(other, INPUT_A));
        assert!(builder.connections().is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut builder = GraphBuilder::new();
        let x = builder.add_node("x", tutorial());
        let y = builder.add_node("y", tutorial());

        builder.connect(x, OUTPUT_SUM, y, INPUT_A).unwrap();
        builder.connect(y, OUTPUT_SUM, x, INPUT_A).unwrap();

        match builder.build(OperatorSettings::default()) {
            Err(GraphError::Cycle { nodes }) => {
                assert_eq!(nodes.len(), 2);
                assert!(nodes.contains(&x) && nodes.contains(&y));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_failures_are_collected_and_downstream_skipped() {
        let mut builder = GraphBuilder::new();
        let broken = builder.add_node("broken", tutorial());
        let downstream = builder.add_node("downstream", tutorial());
        let lonely = builder.add_node("lonely", tutorial());

        builder.connect(broken, OUTPUT_SUM, downstream, INPUT_A).unwrap();

        match builder.build(OperatorSettings::default()) {
            Err(GraphError::Build { failures, skipped }) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(skipped, vec![downstream]);

                let broken_failure = failures.iter().find(|f| f.node == broken).unwrap();
                assert_eq!(broken_failure.name, "broken");
                assert!(broken_failure.errors.has_missing_input(INPUT_A));
                assert!(broken_failure.errors.has_missing_input(INPUT_B));

                let lonely_failure = failures.iter().find(|f| f.node == lonely).unwrap();
                assert_eq!(lonely_failure.errors.len(), 2);
            }
            other => panic!("expected build failure, got {:?}", other),
        }
    }

    #[test]
    fn test_binding_type_checked() {
        let mut builder = GraphBuilder::new();
        let node = builder.add_node("node", tutorial());
        let wrong = DataWriteReference::new(AudioBuffer::silence(4));

        assert!(matches!(
            builder.bind_input(node, INPUT_A, AnyDataReference::from_write(&wrong)),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert_eq!(builder.node_by_name("node"), Some(node));
        assert_eq!(builder.node_by_name("missing"), None);
    }

    #[test]
    fn test_read_output_errors() {
        let mut builder = GraphBuilder::new();
        let node = builder.add_node("node", tutorial());
        let (_a, a_ref) = float(1.0);
        let (_b, b_ref) = float(1.0);
        builder.bind_input(node, INPUT_A, a_ref).unwrap();
        builder.bind_input(node, INPUT_B, b_ref).unwrap();

        let graph = builder.build(OperatorSettings::default()).unwrap();
        assert!(matches!(
            graph.read_output::<i32>(node, OUTPUT_SUM),
            Err(GraphError::Output {
                source: DataReferenceError::TypeMismatch { .. },
                ..
            })
        ));
        assert!(matches!(
            graph.read_output::<f32>(Uuid::new_v4(), OUTPUT_SUM),
            Err(GraphError::NodeNotFound { .. })
        ));
        assert!(graph.operator(node).is_some());
    }

    #[test]
    fn test_graphs_run_on_separate_threads() {
        let handles: Vec<_> = [1.0f32, 100.0]
            .into_iter()
            .map(|value| {
                let mut builder = GraphBuilder::new();
                let node = builder.add_node("add", tutorial());
                let (writer, a_ref) = float(value);
                let (_b, b_ref) = float(value);
                builder.bind_input(node, INPUT_A, a_ref).unwrap();
                builder.bind_input(node, INPUT_B, b_ref).unwrap();
                let mut graph = builder.build(OperatorSettings::default()).unwrap();

                std::thread::spawn(move || {
                    let mut writer = writer;
                    writer.set(value * 2.0);
                    graph.execute_block();
                    graph.read_output::<f32>(node, OUTPUT_SUM).unwrap().get()
                })
            })
            .collect();

        let results: Vec<f32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![3.0, 300.0]);
    }

    #[test]
    fn test_build_error_message() {
        let error = GraphError::Build {
            failures: vec![NodeBuildFailure {
                node: Uuid::nil(),
                name: "n".to_string(),
                errors: BuildError::MissingRequiredInput {
                    vertex: "A".to_string(),
                }
                .into(),
            }],
            skipped: vec![],
        };
        assert!(error
            .to_string()
            .contains("1 node(s) failed, 0 skipped: 'n'"));
    }
}
