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

use thiserror::Error;

use crate::config::ConfigError;
use crate::data::DataReferenceError;
use crate::graph::GraphError;
use crate::interface::VertexNotFound;
use crate::parameters::DescriptorError;
use crate::processing::BuildErrors;
use crate::registry::RegistryError;

/// Orpheus Sound全体のエラー型
///
/// 各モジュールのエラーはそれぞれの型のまま返し、境界でこの型に集約する。
#[derive(Debug, Error)]
pub enum EngineError {
    /// ノード記述の不正
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Vertex(#[from] VertexNotFound),

    /// オペレーター構築の失敗
    #[error("Operator build failed: {0}")]
    Build(#[from] BuildErrors),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Data reference error: {0}")]
    Data(#[from] DataReferenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// 結果型のエイリアス
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{NodeClassKey, NodeClassName};

    fn registry_failure() -> EngineResult<()> {
        let lookup: Result<(), RegistryError> = Err(RegistryError::NotFound {
            key: NodeClassKey {
                class_name: NodeClassName::new("UE", "Missing", ""),
                major_version: 1,
            },
        });
        lookup?;
        Ok(())
    }

    #[test]
    fn test_question_mark_conversion() {
        let error = registry_failure().unwrap_err();
        assert!(matches!(error, EngineError::Registry(RegistryError::NotFound { .. })));
        assert_eq!(error.to_string(), "Registry error: Node class not found: UE.Missing v1");
    }

    #[test]
    fn test_descriptor_message() {
        let error: EngineError = DescriptorError::EmptyName.into();
        assert_eq!(
            error.to_string(),
            "Invalid descriptor: vertex name must not be empty"
        );
    }
}
