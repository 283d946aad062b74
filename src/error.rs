use std::convert::Infallible;

use crate::ledger::Role;
use crate::request::TransferStatus;
use crate::workflow::Action;

/// Errors surfaced by the transfer workflow. Every variant leaves the
/// request in a well-defined prior state; nothing here is fatal at the
/// process level.
#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    #[error("transfer {0} not found")]
    NotFound(String),

    /// A concurrent transition won the race, or the action's expected state
    /// no longer matches the stored one. Reload and retry.
    #[error("stale state for transfer {0}: a concurrent transition applied first")]
    Stale(String),

    #[error("{role:?} is not authorized to {action:?} a transfer in {status:?}")]
    Unauthorized {
        role: Role,
        action: Action,
        status: TransferStatus,
    },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("invalid transfer draft: {0}")]
    Draft(#[from] DraftError),

    /// The player reassignment failed; the approval transition was rolled
    /// back and the caller may retry the action.
    #[error("player reassignment failed, transition rolled back: {0}")]
    Effector(#[from] EffectorError),

    #[error(transparent)]
    Storage(#[from] sled::Error),

    #[error("ledger entry encoding failed: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),

    #[error("stored record decoding failed: {0}")]
    Decode(#[from] minicbor::decode::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Validation failures raised when finalising a [`crate::request::TransferDraft`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DraftError {
    #[error("player reference is not set")]
    MissingPlayer,
    #[error("destination club is not set")]
    MissingDestination,
    #[error("origin and destination club are the same")]
    SameClub,
    #[error("transfer type is not set")]
    MissingTransferType,
    #[error("contract window is not set")]
    MissingContractWindow,
    #[error("contract start must not be after contract end")]
    ContractWindowOrder,
    #[error("loan transfers require a loan end date")]
    MissingLoanEnd,
    #[error("loan end date falls outside the contract window")]
    LoanEndOutsideWindow,
}

/// Failure mode of the consumed [`crate::effector::PlayerAssignment`]
/// collaborator.
#[derive(thiserror::Error, Debug)]
pub enum EffectorError {
    #[error("recoverable assignment failure: {0}")]
    Recoverable(String),
}
