pub mod audio_add;
pub mod tutorial_add;

pub use audio_add::AudioAddOperator;
pub use tutorial_add::TutorialAddOperator;

use crate::parameters::DescriptorError;
use crate::registry::NodeFactory;

/// 標準ノードの名前空間
pub const STANDARD_NAMESPACE: &str = "UE";

pub const PLUGIN_AUTHOR: &str = "Orpheus Sound";

pub const PLUGIN_NODE_MISSING_PROMPT: &str = "Enable the NodeExt module to use this node";

/// 組み込みノードのファクトリ一覧（モジュール起動時に登録される）
pub fn builtin_factories() -> Result<Vec<NodeFactory>, DescriptorError> {
    Ok(vec![
        NodeFactory::of::<TutorialAddOperator>()?,
        NodeFactory::of::<AudioAddOperator>()?,
    ])
}
