use thiserror::Error;

use crate::catalog::TreeId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Config must have a version")]
    MissingVersion,

    #[error("Config must have a valid maxSkillPoints value, got {0}")]
    InvalidMaxSkillPoints(u32),

    #[error("Missing tree configuration for tree {0}")]
    MissingTree(TreeId),

    #[error("Incomplete configuration for tree {0}")]
    IncompleteTree(TreeId),

    #[error("Invalid node configuration in tree {tree}: {id}")]
    InvalidNode { tree: TreeId, id: String },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Unknown config mode: {0}")]
    UnknownMode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
