use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 頂点（ピン）が運ぶデータの型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int32,
    Float,
    String,
    /// 1ブロック分のモノラルサンプル
    Audio,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int32 => "int32",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// 静的メタデータに書かれるデフォルト値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Int32(i32),
    Float(f32),
    String(String),
}

impl Literal {
    /// このリテラルから `data_type` の値を作れるか
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type),
            (Literal::Bool(_), DataType::Bool)
                | (Literal::Int32(_), DataType::Int32)
                | (Literal::Int32(_), DataType::Float)
                | (Literal::Float(_), DataType::Float)
                | (Literal::String(_), DataType::String)
                | (Literal::Int32(_), DataType::Audio)
                | (Literal::Float(_), DataType::Audio)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Bool(_) => "bool",
            Literal::Int32(_) => "int32",
            Literal::Float(_) => "float",
            Literal::String(_) => "string",
        }
    }
}

/// 静的メタデータの不備（登録時に致命的）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    #[error("Invalid descriptor: vertex name must not be empty")]
    EmptyName,

    #[error("Invalid descriptor: duplicate {direction} vertex '{name}'")]
    DuplicateVertex { direction: &'static str, name: String },

    #[error("Invalid descriptor: default for '{name}' is a {literal} literal, which cannot become {data_type}")]
    IncompatibleDefault {
        name: String,
        data_type: DataType,
        literal: &'static str,
    },
}

/// パラメーター記述子 - 入力または出力ひとつ分の静的な説明
///
/// 同一性は名前のみで決まる。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    name: String,
    data_type: DataType,
    display_name: String,
    description: String,
    default_value: Option<Literal>,
}

impl ParameterDescriptor {
    pub fn new(name: &str, data_type: DataType) -> Result<Self, DescriptorError> {
        if name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }

        Ok(Self {
            name: name.to_string(),
            data_type,
            display_name: name.to_string(),
            description: String::new(),
            default_value: None,
        })
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// デフォルト値を持つ入力は未接続でもビルドできる
    pub fn with_default(mut self, literal: Literal) -> Self {
        self.default_value = Some(literal);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_value(&self) -> Option<&Literal> {
        self.default_value.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.default_value.is_none()
    }

    /// デフォルト値が宣言された型に変換できるか検証
    pub fn validate(&self) -> Result<(), DescriptorError> {
        match &self.default_value {
            Some(literal) if !literal.is_compatible_with(self.data_type) => {
                Err(DescriptorError::IncompatibleDefault {
                    name: self.name.clone(),
                    data_type: self.data_type,
                    literal: literal.kind(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl PartialEq for ParameterDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ParameterDescriptor {}

impl Hash for ParameterDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
