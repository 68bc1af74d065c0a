//! Error types for reward distribution

use thiserror::Error;

/// Result type for reward operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reward distribution errors
#[derive(Error, Debug)]
pub enum Error {
    /// Proof does not reproduce the current root
    #[error("Invalid Merkle proof")]
    InvalidMerkleProof,

    /// Claimant is not the caller
    #[error("Invalid account")]
    InvalidAccount,

    /// Caller is not the guardian
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Tree built from no leaves
    #[error("Cannot build a Merkle tree without leaves")]
    EmptyTree,

    /// Two leaves share an index
    #[error("Duplicate leaf index: {0}")]
    DuplicateLeafIndex(u64),

    /// Accumulated claims exceed u128
    #[error("Arithmetic overflow")]
    Overflow,

    /// Escrow-side error (account parsing)
    #[error("Escrow error: {0}")]
    Escrow(#[from] escrow_core::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
