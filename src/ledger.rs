//! Append-only approval ledger
//!
//! Every approve / reject / certify decision appends one entry; submit is
//! not a decision and is not logged. Entries are hash-chained: each entry
//! records the sha256 digest of its predecessor's CBOR encoding, so any
//! rewrite of history breaks the chain. The ledger is the source of truth —
//! folding it must reproduce the request's denormalized `status`.
use std::convert::Infallible;

use chrono::Utc;

use super::error::TransferError;
use super::request::{TimeStamp, TransferRequest, TransferStatus};
use super::workflow::decision_step;

/// The four parties that can put a decision on the ledger.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[n(0)]
    OriginClub,
    #[n(1)]
    DestinationClub,
    #[n(2)]
    Federation,
    #[n(3)]
    CertifyingAuthority,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    #[n(0)]
    Approved,
    #[n(1)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    #[n(0)]
    pub transfer_id: String,
    #[n(1)]
    pub seq: u32, // dense, 0-based per transfer
    #[n(2)]
    pub role: Role,
    #[n(3)]
    pub decision: Decision,
    #[n(4)]
    pub comment: Option<String>, // rejection reason lands here too
    #[n(5)]
    pub decided_at: TimeStamp<Utc>,
    #[n(6)]
    pub prev: Option<String>, // hex sha256 of the previous entry's CBOR
}

impl LedgerEntry {
    pub fn new(
        transfer_id: String,
        seq: u32,
        role: Role,
        decision: Decision,
        comment: Option<String>,
        prev: Option<String>,
    ) -> Self {
        Self {
            transfer_id,
            seq,
            role,
            decision,
            comment,
            decided_at: TimeStamp::new(),
            prev,
        }
    }

    /// Serialise to CBOR and return the encoding with its sha256 digest.
    pub fn build(&self) -> Result<(String, Vec<u8>), minicbor::encode::Error<Infallible>> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// Replay the ledger against the shape of the request (origin club present?
/// certification required?) and return the status the decisions lead to.
///
/// This must agree with the stored `status` for every request the workflow
/// has touched; a mismatch means the denormalized field has drifted.
pub fn fold_status(
    request: &TransferRequest,
    entries: &[LedgerEntry],
) -> Result<TransferStatus, TransferError> {
    let mut status = if request.from_club_id.is_some() {
        TransferStatus::PendingOriginClub
    } else {
        TransferStatus::PendingDestinationClub
    };

    for entry in entries {
        if status.is_terminal() {
            return Err(TransferError::Precondition(format!(
                "ledger entry {} for {} follows terminal state {:?}",
                entry.seq, entry.transfer_id, status
            )));
        }
        status = decision_step(status, entry.role, entry.decision, request)
            .ok_or_else(|| {
                TransferError::Precondition(format!(
                    "ledger entry {} for {} does not fit state {:?}: {:?} {:?}",
                    entry.seq, entry.transfer_id, status, entry.role, entry.decision
                ))
            })?;
    }

    Ok(status)
}

/// Walk the hash links and sequence numbers of a history, oldest first.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<(), TransferError> {
    let mut prev_hash: Option<String> = None;

    for (idx, entry) in entries.iter().enumerate() {
        if entry.seq as usize != idx {
            return Err(TransferError::Precondition(format!(
                "ledger for {} is not dense: entry {} holds seq {}",
                entry.transfer_id, idx, entry.seq
            )));
        }
        if entry.prev != prev_hash {
            return Err(TransferError::Precondition(format!(
                "ledger chain for {} broken at seq {}",
                entry.transfer_id, entry.seq
            )));
        }
        let (hash, _) = entry.build()?;
        prev_hash = Some(hash);
    }

    Ok(())
}
