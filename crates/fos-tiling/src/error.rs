//! Tiling Errors

use crate::layer_tree::LayerId;
use crate::priority::TreeKind;

/// Errors from operations a caller can misuse
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TilingError {
    #[error("Invalid contents scale: {0}")]
    InvalidScale(f32),

    #[error("Tiling already exists at scale {0}")]
    DuplicateScale(f32),

    #[error("Layer {0:?} cannot have tilings")]
    CannotHaveTilings(LayerId),

    #[error("Layer {id:?} not found in {tree:?} tree")]
    LayerNotFound { id: LayerId, tree: TreeKind },

    #[error("No pending tree to activate")]
    NoPendingTree,

    #[error("Invalid tiling settings: {0}")]
    InvalidSettings(&'static str),
}

/// Result alias for tiling operations
pub type Result<T> = std::result::Result<T, TilingError>;
