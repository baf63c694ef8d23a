//! Engine error types.
//!
//! Three tiers of failure come out of the engine:
//!
//! 1. **Rejections**: the header, seal, or transaction is invalid. The caller
//!    drops the block and moves on.
//! 2. **Ordinary failures**: a collaborator (contract call, executor, store)
//!    failed while finalizing. The block import fails and is reported.
//! 3. **Unrecoverable failures** ([`DposError::Unrecoverable`]): a step whose
//!    outcome every node must agree on (bootstrap, punishment, election)
//!    could not be completed. Finalizing past it would fork the chain, so the
//!    import pipeline must halt instead of reporting. See [`DposError::is_fatal`].

use crate::signer::SignerError;
use dpos_core::{ContractError, ExecutionError, StorageError};
use dpos_types::{CryptoError, Hash, U256};
use thiserror::Error;

/// Errors returned by the consensus engine.
#[derive(Debug, Error)]
pub enum DposError {
    // ═══════════════════════════════════════════════════════════════════════
    // Header rejections
    // ═══════════════════════════════════════════════════════════════════════
    #[error("unknown block")]
    UnknownBlock,

    #[error("block in the future")]
    FutureBlock,

    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,

    #[error("non-checkpoint block contains extra validator list")]
    ExtraValidators,

    #[error("invalid extra validators in extra data field")]
    InvalidExtraValidators,

    #[error("non-zero mix digest")]
    InvalidMixDigest,

    #[error("non empty uncle hash")]
    InvalidUncleHash,

    #[error("invalid difficulty")]
    InvalidDifficulty,

    #[error("wrong difficulty")]
    WrongDifficulty,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("invalid gasLimit: have {have}, max {max}")]
    InvalidGasLimit { have: u64, max: u64 },

    #[error("invalid gasUsed: have {have}, gasLimit {limit}")]
    InvalidGasUsed { have: u64, limit: u64 },

    #[error("invalid baseFee: {0}")]
    InvalidBaseFee(String),

    #[error("unknown ancestor")]
    UnknownAncestor,

    #[error("uncles not allowed")]
    UnclesNotAllowed,

    #[error("invalid voting chain")]
    InvalidVotingChain,

    #[error("unauthorized validator")]
    UnauthorizedValidator,

    #[error("recently signed")]
    RecentlySigned,

    #[error("invalid coin base")]
    InvalidCoinbase,

    // ═══════════════════════════════════════════════════════════════════════
    // Finalization and transaction rejections
    // ═══════════════════════════════════════════════════════════════════════
    #[error("invalid validators length: {0}")]
    InvalidValidatorsLength(usize),

    #[error("invalid system governance tx count: expected {expected}, got {got}")]
    InvalidSysGovCount { expected: usize, got: usize },

    #[error("address denied")]
    AddressDenied,

    #[error("signing function not set")]
    SignFnNotSet,

    #[error("signTxFn not set")]
    SignTxFnNotSet,

    #[error("invalid governance tx sender")]
    InvalidGovernanceSender,

    #[error("data of proposal {id} does not match transaction {tx_hash:?}")]
    ProposalDataMismatch { id: U256, tx_hash: Hash },

    #[error("invalid seal signature length: {0}")]
    InvalidSealLength(usize),

    // ═══════════════════════════════════════════════════════════════════════
    // Collaborator failures
    // ═══════════════════════════════════════════════════════════════════════
    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("rlp decoding failed: {0}")]
    Rlp(#[from] rlp::DecoderError),

    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecoverable: {0}")]
    Unrecoverable(#[from] FatalError),
}

impl DposError {
    /// Whether the import pipeline must halt rather than report this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DposError::Unrecoverable(_))
    }
}

/// A step of finalization that every node must complete identically.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to initialize system contracts: {0}")]
    Bootstrap(Box<DposError>),

    #[error("failed to punish validator: {0}")]
    Punish(Box<DposError>),

    #[error("failed to elect validators: {0}")]
    Election(Box<DposError>),
}

impl FatalError {
    pub(crate) fn bootstrap(err: impl Into<DposError>) -> DposError {
        DposError::Unrecoverable(FatalError::Bootstrap(Box::new(err.into())))
    }

    pub(crate) fn punish(err: impl Into<DposError>) -> DposError {
        DposError::Unrecoverable(FatalError::Punish(Box::new(err.into())))
    }

    pub(crate) fn election(err: impl Into<DposError>) -> DposError {
        DposError::Unrecoverable(FatalError::Election(Box::new(err.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DposError::InvalidGasLimit { have: 10, max: 5 };
        assert_eq!(err.to_string(), "invalid gasLimit: have 10, max 5");

        let err = DposError::InvalidSysGovCount {
            expected: 2,
            got: 1,
        };
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!DposError::RecentlySigned.is_fatal());
        assert!(!DposError::InvalidExtraValidators.is_fatal());

        let err = FatalError::election(DposError::UnknownAncestor);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("unknown ancestor"));
    }

    #[test]
    fn test_collaborator_errors_convert() {
        let err: DposError = StorageError::DatabaseError("disk".into()).into();
        assert!(matches!(err, DposError::Storage(_)));
        assert!(!err.is_fatal());

        let err: DposError =
            ContractError::call("tryElect", ExecutionError::Reverted("no".into())).into();
        assert!(matches!(err, DposError::Contract(_)));
    }
}
