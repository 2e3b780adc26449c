use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameters::{DescriptorError, ParameterDescriptor};

/// 指定した名前の頂点がインターフェースに存在しない
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{direction} vertex '{name}' not found")]
pub struct VertexNotFound {
    pub direction: &'static str,
    pub name: String,
}

/// ノードの形を決める入力・出力記述子の不変な集合
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexInterface {
    inputs: Vec<ParameterDescriptor>,
    outputs: Vec<ParameterDescriptor>,
}

impl VertexInterface {
    /// 入力名・出力名の重複とデフォルト値の型を検証して作成
    pub fn new(
        inputs: Vec<ParameterDescriptor>,
        outputs: Vec<ParameterDescriptor>,
    ) -> Result<Self, DescriptorError> {
        check_unique("input", &inputs)?;
        check_unique("output", &outputs)?;

        for descriptor in inputs.iter().chain(outputs.iter()) {
            descriptor.validate()?;
        }

        Ok(Self { inputs, outputs })
    }

    pub fn inputs(&self) -> &[ParameterDescriptor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ParameterDescriptor] {
        &self.outputs
    }

    pub fn get_input(&self, name: &str) -> Result<&ParameterDescriptor, VertexNotFound> {
        self.inputs
            .iter()
            .find(|d| d.name() == name)
            .ok_or_else(|| VertexNotFound {
                direction: "input",
                name: name.to_string(),
            })
    }

    pub fn get_output(&self, name: &str) -> Result<&ParameterDescriptor, VertexNotFound> {
        self.outputs
            .iter()
            .find(|d| d.name() == name)
            .ok_or_else(|| VertexNotFound {
                direction: "output",
                name: name.to_string(),
            })
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|d| d.name())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|d| d.name())
    }

    /// `previous` を使っていたグラフがこのインターフェースでもそのままビルドできるか
    ///
    /// 既存の入出力は同じ型で残っている必要があり、追加された入力はデフォルト値を持つこと。
    pub fn is_compatible_with(&self, previous: &VertexInterface) -> bool {
        let same_type = |current: &[ParameterDescriptor], old: &ParameterDescriptor| {
            current
                .iter()
                .any(|d| d.name() == old.name() && d.data_type() == old.data_type())
        };

        let inputs_kept = previous.inputs.iter().all(|old| same_type(&self.inputs, old));
        let outputs_kept = previous.outputs.iter().all(|old| same_type(&self.outputs, old));
        let additions_defaulted = self
            .inputs
            .iter()
            .filter(|d| previous.get_input(d.name()).is_err())
            .all(|d| !d.is_required());

        inputs_kept && outputs_kept && additions_defaulted
    }
}

fn check_unique(direction: &'static str, descriptors: &[ParameterDescriptor]) -> Result<(), DescriptorError> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if !seen.insert(descriptor.name()) {
            return Err(DescriptorError::DuplicateVertex {
                direction,
                name: descriptor.name().to_string(),
            });
        }
    }
    Ok(())
}

/// ノードクラス名 (namespace, name, variant)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeClassName {
    pub namespace: String,
    pub name: String,
    pub variant: String,
}

impl NodeClassName {
    pub fn new(namespace: &str, name: &str, variant: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            variant: variant.to_string(),
        }
    }
}

impl fmt::Display for NodeClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() {
            write!(f, "{}.{}", self.namespace, self.name)
        } else {
            write!(f, "{}.{}.{}", self.namespace, self.name, self.variant)
        }
    }
}

/// レジストリの識別キー。マイナーバージョンは含まない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeClassKey {
    pub class_name: NodeClassName,
    pub major_version: u32,
}

impl fmt::Display for NodeClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.class_name, self.major_version)
    }
}

/// ノードクラスのメタデータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeClassMetadata {
    pub class_name: NodeClassName,
    pub major_version: u32,
    pub minor_version: u32,
    pub display_name: String,
    pub description: String,
    pub author: String,
    pub prompt_if_missing: String,
    pub category_hierarchy: Vec<String>,
    pub keywords: Vec<String>,
    pub interface: VertexInterface,
}

impl NodeClassMetadata {
    pub fn new(
        class_name: NodeClassName,
        major_version: u32,
        minor_version: u32,
        interface: VertexInterface,
    ) -> Self {
        Self {
            display_name: class_name.name.clone(),
            class_name,
            major_version,
            minor_version,
            description: String::new(),
            author: String::new(),
            prompt_if_missing: String::new(),
            category_hierarchy: Vec::new(),
            keywords: Vec::new(),
            interface,
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    pub fn with_prompt_if_missing(mut self, prompt: &str) -> Self {
        self.prompt_if_missing = prompt.to_string();
        self
    }

    pub fn with_category(mut self, category: &[&str]) -> Self {
        self.category_hierarchy = category.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn key(&self) -> NodeClassKey {
        NodeClassKey {
            class_name: self.class_name.clone(),
            major_version: self.major_version,
        }
    }

    pub fn version_string(&self) -> String {
        format!("{}.{}", self.major_version, self.minor_version)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
