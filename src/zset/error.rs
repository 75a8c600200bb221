use crate::dict::error::HashError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ZSetError {
    #[error("[ZSet]Score Is Not A Number")]
    ScoreIsNaN,
    #[error("[ZSet]Invalid Range: {0}")]
    InvalidRange(String),
    #[error("[ZSet]Incompatible Flags: {0}")]
    InvalidFlags(&'static str),
    #[error("[ZSet]Dict And Skiplist Out Of Sync: {0}")]
    Desync(String),
    #[error(transparent)]
    Dict(#[from] HashError),
}
