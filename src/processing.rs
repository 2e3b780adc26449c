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

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::data::{DataReadReference, DataReferenceCollection, DataValue, DataWriteReference};
use crate::interface::{NodeClassMetadata, VertexInterface};
use crate::parameters::{DataType, DescriptorError};

/// オペレーター構築時の設定。ビルドごとに不変。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatorSettings {
    sample_rate: f32,
    block_size: usize,
}

impl OperatorSettings {
    pub fn new(sample_rate: f32, block_size: usize) -> Result<Self, ConfigError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSettings {
                reason: format!("sample rate must be positive, got {}", sample_rate),
            });
        }
        if block_size == 0 {
            return Err(ConfigError::InvalidSettings {
                reason: "block size must be at least one frame".to_string(),
            });
        }

        Ok(Self {
            sample_rate,
            block_size,
        })
    }

    /// サンプリングレート（Hz）
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// 1ブロックのフレーム数
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 1秒あたりの execute 呼び出し回数
    pub fn block_rate(&self) -> f32 {
        self.sample_rate / self.block_size as f32
    }
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 512,
        }
    }
}

/// ノードの実行時インスタンス
///
/// 状態は「構築済み → 実行（繰り返し） → 破棄」のみ。
pub trait Operator: Send {
    /// クラスの静的メタデータ
    fn node_info(&self) -> &'static NodeClassMetadata;

    /// インターフェースが宣言した入力のバインディング
    fn get_inputs(&self) -> DataReferenceCollection;

    /// インターフェースが宣言した出力（このオペレーターが唯一の書き込み元）
    fn get_outputs(&self) -> DataReferenceCollection;

    /// 1ブロックにつき1回呼ばれる。
    ///
    /// リアルタイムのオーディオスレッドで動くため、失敗・ブロック・アロケーションをしないこと。
    fn execute(&mut self);

    /// ダウンキャスト用
    fn as_any(&self) -> &dyn Any;
}

/// 静的なインターフェースを持つオペレーターのクラス側
pub trait OperatorClass: Operator + Sized + 'static {
    /// 一度だけ作られ、以後は同じ参照を返すこと
    fn class_info() -> Result<&'static NodeClassMetadata, DescriptorError>;

    fn declare_vertex_interface() -> Result<&'static VertexInterface, DescriptorError> {
        Self::class_info().map(|info| &info.interface)
    }

    /// 入力エラーはすべて集めてから返す
    fn create_operator(params: &BuildOperatorParams) -> Result<Self, BuildErrors>;
}

/// ファクトリに渡される構築パラメーター
#[derive(Debug, Clone, Default)]
pub struct BuildOperatorParams {
    pub settings: OperatorSettings,
    /// ホストが用意した入力（他ノードの出力やグラフ入力）
    pub inputs: DataReferenceCollection,
}

impl BuildOperatorParams {
    pub fn new(settings: OperatorSettings, inputs: DataReferenceCollection) -> Self {
        Self { settings, inputs }
    }

    /// バインドされた入力を取得し、なければ宣言されたデフォルト値から作成する
    ///
    /// 失敗は `errors` に積んで `None` を返す。呼び出し側は残りの入力の検証を続けられる。
    pub fn get_or_create_default_read<T: DataValue>(
        &self,
        interface: &VertexInterface,
        name: &str,
        errors: &mut BuildErrors,
    ) -> Option<DataReadReference<T>> {
        let descriptor = match interface.get_input(name) {
            Ok(descriptor) => descriptor,
            Err(_) => {
                errors.push(BuildError::UndeclaredVertex {
                    vertex: name.to_string(),
                });
                return None;
            }
        };

        if descriptor.data_type() != T::DATA_TYPE {
            errors.push(BuildError::TypeMismatch {
                vertex: name.to_string(),
                expected: descriptor.data_type(),
                found: T::DATA_TYPE,
            });
            return None;
        }

        if let Some(bound) = self.inputs.get(name) {
            return match bound.to_read::<T>() {
                Ok(reference) => Some(reference),
                Err(_) => {
                    errors.push(BuildError::TypeMismatch {
                        vertex: name.to_string(),
                        expected: T::DATA_TYPE,
                        found: bound.data_type(),
                    });
                    None
                }
            };
        }

        match descriptor.default_value() {
            Some(literal) => match T::from_literal(literal, &self.settings) {
                Some(value) => Some(DataWriteReference::new(value).to_read_reference()),
                None => {
                    errors.push(BuildError::Descriptor(DescriptorError::IncompatibleDefault {
                        name: name.to_string(),
                        data_type: T::DATA_TYPE,
                        literal: literal.kind(),
                    }));
                    None
                }
            },
            None => {
                errors.push(BuildError::MissingRequiredInput {
                    vertex: name.to_string(),
                });
                None
            }
        }
    }
}

/// オペレーター構築エラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Missing required input: {vertex}")]
    MissingRequiredInput { vertex: String },

    #[error("Type mismatch on '{vertex}': expected {expected}, found {found}")]
    TypeMismatch {
        vertex: String,
        expected: DataType,
        found: DataType,
    },

    #[error("Vertex '{vertex}' is not declared by the node interface")]
    UndeclaredVertex { vertex: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// 構築中に見つかったエラーの集合（最初の1件で止めない）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildErrors {
    errors: Vec<BuildError>,
}

impl BuildErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: BuildError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildError> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<BuildError> {
        self.errors
    }

    pub fn has_missing_input(&self, vertex: &str) -> bool {
        self.errors.iter().any(|e| {
            matches!(e, BuildError::MissingRequiredInput { vertex: v } if v == vertex)
        })
    }

    /// エラーがなければ `value` を返す
    pub fn into_result<T>(self, value: T) -> Result<T, BuildErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} build error(s)", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            let separator = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", separator, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildErrors {}

impl From<BuildError> for BuildErrors {
    fn from(error: BuildError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl From<DescriptorError> for BuildErrors {
    fn from(error: DescriptorError) -> Self {
        BuildError::Descriptor(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Literal, ParameterDescriptor};

    fn interface() -> VertexInterface {
        VertexInterface::new(
            vec![
                ParameterDescriptor::new("required", DataType::Float).unwrap(),
                ParameterDescriptor::new("defaulted", DataType::Float)
                    .unwrap()
                    .with_default(Literal::Float(0.5)),
                ParameterDescriptor::new("count", DataType::Int32).unwrap(),
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_settings_validation() {
        assert!(OperatorSettings::new(48000.0, 128).is_ok());
        assert!(OperatorSettings::new(0.0, 128).is_err());
        assert!(OperatorSettings::new(f32::NAN, 128).is_err());
        assert!(OperatorSettings::new(48000.0, 0).is_err());

        let settings = OperatorSettings::new(48000.0, 480).unwrap();
        assert_eq!(settings.block_rate(), 100.0);
        assert_eq!(OperatorSettings::default().block_size(), 512);
    }

    #[test]
    fn test_bound_input_is_shared() {
        let mut writer = DataWriteReference::new(2.0f32);
        let mut inputs = DataReferenceCollection::new();
        inputs.add_read_reference("required", &writer.to_read_reference());
        let params = BuildOperatorParams::new(OperatorSettings::default(), inputs);

        let mut errors = BuildErrors::new();
        let reference = params
            .get_or_create_default_read::<f32>(&interface(), "required", &mut errors)
            .unwrap();

        writer.set(9.0);
        assert_eq!(reference.get(), 9.0);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_default_is_synthesized() {
        let params = BuildOperatorParams::default();
        let mut errors = BuildErrors::new();

        let reference = params
            .get_or_create_default_read::<f32>(&interface(), "defaulted", &mut errors)
            .unwrap();

        assert_eq!(reference.get(), 0.5);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut inputs = DataReferenceCollection::new();
        inputs.add_read_reference(
            "count",
            &DataWriteReference::new(1.0f32).to_read_reference(),
        );
        let params = BuildOperatorParams::new(OperatorSettings::default(), inputs);
        let interface = interface();

        let mut errors = BuildErrors::new();
        let required = params.get_or_create_default_read::<f32>(&interface, "required", &mut errors);
        let count = params.get_or_create_default_read::<i32>(&interface, "count", &mut errors);
        let unknown = params.get_or_create_default_read::<f32>(&interface, "nope", &mut errors);

        assert!(required.is_none() && count.is_none() && unknown.is_none());
        assert_eq!(errors.len(), 3);
        assert!(errors.has_missing_input("required"));
        assert!(errors.iter().any(|e| matches!(
            e,
            BuildError::TypeMismatch { vertex, expected: DataType::Int32, found: DataType::Float } if vertex == "count"
        )));
        assert!(errors
            .iter()
            .any(|e| matches!(e, BuildError::UndeclaredVertex { vertex } if vertex == "nope")));

        let message = errors.to_string();
        assert!(message.starts_with("3 build error(s): Missing required input: required"));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(BuildErrors::new().into_result(5), Ok(5));

        let errors: BuildErrors = BuildError::MissingRequiredInput {
            vertex: "A".to_string(),
        }
        .into();
        assert!(errors.into_result(5).is_err());
    }
}
