use std::any::Any;

use lazy_static::lazy_static;

use crate::data::{DataReadReference, DataReferenceCollection, DataWriteReference};
use crate::interface::{NodeClassMetadata, NodeClassName, VertexInterface};
use crate::parameters::{DataType, DescriptorError, ParameterDescriptor};
use crate::processing::{BuildErrors, BuildOperatorParams, Operator, OperatorClass};

use super::{PLUGIN_AUTHOR, PLUGIN_NODE_MISSING_PROMPT, STANDARD_NAMESPACE};

/// 頂点名
pub mod vertex_names {
    pub const INPUT_A: &str = "A";
    pub const INPUT_B: &str = "B";
    pub const OUTPUT_SUM: &str = "Sum of A and B";
}

use vertex_names::*;

lazy_static! {
    static ref CLASS_INFO: Result<NodeClassMetadata, DescriptorError> = build_class_info();
}

fn build_class_info() -> Result<NodeClassMetadata, DescriptorError> {
    let interface = VertexInterface::new(
        vec![
            ParameterDescriptor::new(INPUT_A, DataType::Float)?.with_description("Input value A."),
            ParameterDescriptor::new(INPUT_B, DataType::Float)?.with_description("Input value B."),
        ],
        vec![ParameterDescriptor::new(OUTPUT_SUM, DataType::Float)?
            .with_description("The sum of A and B.")],
    )?;

    Ok(NodeClassMetadata::new(
        NodeClassName::new(STANDARD_NAMESPACE, "Tutorial Node", "Audio"),
        1,
        0,
        interface,
    )
    .with_display_name("Tutorial Node")
    .with_description("A simple node to demonstrate how to create new MetaSound nodes in C++.Adds two floats together")
    .with_author(PLUGIN_AUTHOR)
    .with_prompt_if_missing(PLUGIN_NODE_MISSING_PROMPT)
    .with_category(&["Math"])
    .with_keywords(&["add", "sum", "tutorial"]))
}

/// A + B を出力する教材用ノード
///
/// 出力は構築時に一度計算されるので、最初のブロックより前でも有効な値を持つ。
pub struct TutorialAddOperator {
    info: &'static NodeClassMetadata,
    input_a: DataReadReference<f32>,
    input_b: DataReadReference<f32>,
    output: DataWriteReference<f32>,
}

impl TutorialAddOperator {
    pub fn new(
        info: &'static NodeClassMetadata,
        input_a: DataReadReference<f32>,
        input_b: DataReadReference<f32>,
    ) -> Self {
        let initial = Self::sum(&input_a, &input_b);
        Self {
            info,
            input_a,
            input_b,
            output: DataWriteReference::new(initial),
        }
    }

    fn sum(a: &DataReadReference<f32>, b: &DataReadReference<f32>) -> f32 {
        a.get() + b.get()
    }

    /// 現在の出力値
    pub fn value(&self) -> f32 {
        self.output.get()
    }

    pub fn output(&self) -> DataReadReference<f32> {
        self.output.to_read_reference()
    }
}

impl OperatorClass for TutorialAddOperator {
    fn class_info() -> Result<&'static NodeClassMetadata, DescriptorError> {
        CLASS_INFO.as_ref().map_err(Clone::clone)
    }

    fn create_operator(params: &BuildOperatorParams) -> Result<Self, BuildErrors> {
        let info = Self::class_info()?;

        let mut errors = BuildErrors::new();
        let a = params.get_or_create_default_read::<f32>(&info.interface, INPUT_A, &mut errors);
        let b = params.get_or_create_default_read::<f32>(&info.interface, INPUT_B, &mut errors);

        match (a, b) {
            (Some(a), Some(b)) if errors.is_empty() => Ok(Self::new(info, a, b)),
            _ => Err(errors),
        }
    }
}

impl Operator for TutorialAddOperator {
    fn node_info(&self) -> &'static NodeClassMetadata {
        self.info
    }

    fn get_inputs(&self) -> DataReferenceCollection {
        let mut inputs = DataReferenceCollection::new();
        inputs.add_read_reference(INPUT_A, &self.input_a);
        inputs.add_read_reference(INPUT_B, &self.input_b);
        inputs
    }

    fn get_outputs(&self) -> DataReferenceCollection {
        let mut outputs = DataReferenceCollection::new();
        outputs.add_write_reference(OUTPUT_SUM, &self.output);
        outputs
    }

    fn execute(&mut self) {
        let sum = Self::sum(&self.input_a, &self.input_b);
        self.output.set(sum);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
