use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use orpheus_sound::nodes::tutorial_add::vertex_names::{INPUT_A, INPUT_B, OUTPUT_SUM};
use orpheus_sound::{
    AnyDataReference, DataWriteReference, EngineConfig, GraphBuilder, ModuleManager, NodeClassName, NodeRegistry,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from_file(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::default(),
    };
    let settings = config.operator_settings()?;

    let registry = NodeRegistry::global();
    let mut modules = ModuleManager::from_config(&config, Arc::clone(&registry))?;
    modules.startup_all()?;

    let result = run(&registry, settings);
    modules.shutdown_all();
    result
}

fn run(registry: &NodeRegistry, settings: orpheus_sound::OperatorSettings) -> Result<()> {
    for info in registry.list() {
        info!(class = %info.class_name, version = %info.version_string(), "Registered node class");
    }

    let factory = registry
        .find_latest(&NodeClassName::new("UE", "Tutorial Node", "Audio"))
        .context("tutorial node is not registered; enable the NodeExt module")?;

    // (A + B) + C
    let mut a = DataWriteReference::new(2.0f32);
    let b = DataWriteReference::new(3.5f32);
    let c = DataWriteReference::new(1.0f32);

    let mut builder = GraphBuilder::new();
    let first = builder.add_node("first", factory.clone());
    let second = builder.add_node("second", factory.clone());
    builder.bind_input(first, INPUT_A, AnyDataReference::from_write(&a))?;
    builder.bind_input(first, INPUT_B, AnyDataReference::from_write(&b))?;
    builder.connect(first, OUTPUT_SUM, second, INPUT_A)?;
    builder.bind_input(second, INPUT_B, AnyDataReference::from_write(&c))?;

    let mut graph = builder.build(settings)?;
    let output = graph.read_output::<f32>(second, OUTPUT_SUM)?;
    println!("initial: {}", output.get());

    for block in 0..4 {
        a.set(a.get() + 1.0);
        graph.execute_block();
        println!("block {}: {}", block, output.get());
    }

    println!("{}", factory.node_info().to_json()?);
    Ok(())
}
