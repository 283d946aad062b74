//! Service layer API for transfer workflow operations
//!
//! All writes to a request record go through [`sled::Tree::compare_and_swap`]
//! conditioned on the exact bytes read just before, so two racing approvers
//! resolve to one winner and one [`TransferError::Stale`]. The transition
//! into `Approved` additionally claims the effect marker before invoking the
//! player-assignment effector, which bounds the effector to at most one call
//! per transfer.
use std::sync::Arc;

use sled::Db;
use tracing::{debug, warn};

use super::certification::CertificationStatus;
use super::effector::PlayerAssignment;
use super::error::TransferError;
use super::ledger::{Decision, LedgerEntry, Role};
use super::notify::{NoopSink, TransitionSink};
use super::request::{EffectState, TransferDraft, TransferRequest, TransferStatus};
use super::utils;

/// The four verbs a caller can apply to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit,
    Approve,
    Reject,
    Certify,
}

/// One edge of the transition table: which roles may take `action` from the
/// current state, and where it leads. `None` means the action simply does
/// not exist from this state — the caller is acting on stale knowledge.
fn edge(
    status: TransferStatus,
    action: Action,
    request: &TransferRequest,
) -> Option<(&'static [Role], TransferStatus)> {
    use Action::*;
    use Role::*;
    use TransferStatus::*;

    match (status, action) {
        (Draft, Submit) => {
            let target = if request.from_club_id.is_some() {
                PendingOriginClub
            } else {
                PendingDestinationClub
            };
            Some((&[DestinationClub, Federation], target))
        }
        (PendingOriginClub, Approve) => Some((&[OriginClub], PendingDestinationClub)),
        (PendingDestinationClub, Approve) => Some((&[DestinationClub], PendingFederation)),
        (PendingFederation, Approve) => {
            let target = if request.requires_certification {
                AwaitingCertification
            } else {
                Approved
            };
            Some((&[Federation], target))
        }
        (AwaitingCertification, Certify) => Some((&[CertifyingAuthority], Approved)),
        (PendingOriginClub, Reject) => Some((&[OriginClub], Rejected)),
        (PendingDestinationClub, Reject) => Some((&[DestinationClub], Rejected)),
        (PendingFederation, Reject) => Some((&[Federation], Rejected)),
        (AwaitingCertification, Reject) => Some((&[CertifyingAuthority, Federation], Rejected)),
        _ => None,
    }
}

/// Resolve the state `action` by `role` leads to, or the error the attempt
/// deserves: `Stale` when the action has no edge from the stored state,
/// `Unauthorized` when the edge exists but belongs to a different party.
pub(crate) fn next_status(
    request: &TransferRequest,
    action: Action,
    role: Role,
) -> Result<TransferStatus, TransferError> {
    let Some((roles, target)) = edge(request.status, action, request) else {
        return Err(TransferError::Stale(request.transfer_id.clone()));
    };
    if !roles.contains(&role) {
        return Err(TransferError::Unauthorized {
            role,
            action,
            status: request.status,
        });
    }
    Ok(target)
}

/// Replay step used by [`crate::ledger::fold_status`]: map one ledger
/// decision onto the table. Approvals recorded while awaiting certification
/// are certify decisions.
pub(crate) fn decision_step(
    status: TransferStatus,
    role: Role,
    decision: Decision,
    request: &TransferRequest,
) -> Option<TransferStatus> {
    let action = match decision {
        Decision::Approved if status == TransferStatus::AwaitingCertification => Action::Certify,
        Decision::Approved => Action::Approve,
        Decision::Rejected => Action::Reject,
    };
    let (roles, target) = edge(status, action, request)?;
    roles.contains(&role).then_some(target)
}

fn decision_of(action: Action) -> Decision {
    match action {
        Action::Reject => Decision::Rejected,
        _ => Decision::Approved,
    }
}

pub struct TransferService {
    _db: Arc<Db>,
    requests: sled::Tree,
    ledger: sled::Tree,
    effector: Arc<dyn PlayerAssignment>,
    sink: Arc<dyn TransitionSink>,
}

impl TransferService {
    pub fn new(db: Arc<Db>, effector: Arc<dyn PlayerAssignment>) -> Result<Self, TransferError> {
        Self::with_sink(db, effector, Arc::new(NoopSink))
    }

    pub fn with_sink(
        db: Arc<Db>,
        effector: Arc<dyn PlayerAssignment>,
        sink: Arc<dyn TransitionSink>,
    ) -> Result<Self, TransferError> {
        let requests = db.open_tree("requests")?;
        let ledger = db.open_tree("ledger")?;
        Ok(Self {
            _db: db,
            requests,
            ledger,
            effector,
            sink,
        })
    }

    /// Validate a draft, mint its id and persist it already past the draft
    /// state (`PendingOriginClub`, or `PendingDestinationClub` for a free
    /// agent). Submitting is not a ledger decision.
    pub fn submit(
        &self,
        draft: TransferDraft,
        actor: Role,
    ) -> Result<TransferRequest, TransferError> {
        let transfer_id = utils::new_uuid_to_bech32("transfer_")?;
        let mut request = draft.finalise(transfer_id)?;
        request.status = next_status(&request, Action::Submit, actor)?;

        // create-only insert; a colliding id means the caller double-submitted
        let bytes = minicbor::to_vec(&request)?;
        if self
            .requests
            .compare_and_swap(
                request.transfer_id.as_bytes(),
                None as Option<&[u8]>,
                Some(bytes),
            )?
            .is_err()
        {
            return Err(TransferError::Stale(request.transfer_id.clone()));
        }

        debug!(
            transfer_id = %request.transfer_id,
            status = ?request.status,
            "transfer submitted"
        );
        self.notify(&request, Action::Submit);
        Ok(request)
    }

    /// Approve the step the given role currently owns.
    pub fn approve(
        &self,
        transfer_id: &str,
        actor: Role,
        comment: Option<String>,
    ) -> Result<TransferRequest, TransferError> {
        self.decide(transfer_id, Action::Approve, actor, comment)
    }

    /// Reject from any non-terminal state. The reason is mandatory and lands
    /// on both the record and the ledger entry.
    pub fn reject(
        &self,
        transfer_id: &str,
        actor: Role,
        reason: &str,
    ) -> Result<TransferRequest, TransferError> {
        if reason.trim().is_empty() {
            return Err(TransferError::Precondition(
                "rejection requires a non-empty reason".into(),
            ));
        }
        self.decide(transfer_id, Action::Reject, actor, Some(reason.to_owned()))
    }

    pub fn get_status(&self, transfer_id: &str) -> Result<TransferRequest, TransferError> {
        Ok(self.load(transfer_id)?.1)
    }

    /// Decision history for one transfer, oldest first.
    pub fn get_ledger(&self, transfer_id: &str) -> Result<Vec<LedgerEntry>, TransferError> {
        self.load(transfer_id)?;

        let mut entries = Vec::new();
        for kv in self.ledger.scan_prefix(ledger_prefix(transfer_id)) {
            let (_, value) = kv?;
            entries.push(minicbor::decode(&value)?);
        }
        Ok(entries)
    }

    pub(crate) fn load(
        &self,
        transfer_id: &str,
    ) -> Result<(sled::IVec, TransferRequest), TransferError> {
        let raw = self
            .requests
            .get(transfer_id.as_bytes())?
            .ok_or_else(|| TransferError::NotFound(transfer_id.to_owned()))?;
        let request: TransferRequest = minicbor::decode(&raw)?;
        Ok((raw, request))
    }

    /// Conditional write: replace the record only if it still holds the
    /// bytes we read. Returns the bytes now stored.
    pub(crate) fn swap(
        &self,
        old: &[u8],
        next: &TransferRequest,
    ) -> Result<Vec<u8>, TransferError> {
        let bytes = minicbor::to_vec(next)?;
        match self.requests.compare_and_swap(
            next.transfer_id.as_bytes(),
            Some(old),
            Some(bytes.clone()),
        )? {
            Ok(()) => Ok(bytes),
            Err(_) => Err(TransferError::Stale(next.transfer_id.clone())),
        }
    }

    pub(crate) fn decide(
        &self,
        transfer_id: &str,
        action: Action,
        actor: Role,
        comment: Option<String>,
    ) -> Result<TransferRequest, TransferError> {
        let (raw, request) = self.load(transfer_id)?;
        // a claim is only ever held across one in-flight effector call;
        // observing it means another transition is mid-commit
        if request.effect == EffectState::Claimed {
            return Err(TransferError::Stale(transfer_id.to_owned()));
        }
        let next = next_status(&request, action, actor)?;

        let updated = if next == TransferStatus::Approved {
            self.commit_with_effect(&raw, &request, action, actor, comment)?
        } else {
            let mut updated = request.clone();
            updated.status = next;
            if next == TransferStatus::Rejected {
                updated.rejection_reason = comment.clone();
            }
            self.swap(&raw, &updated)?;
            self.append_entry(&updated, actor, decision_of(action), comment)?;
            updated
        };

        debug!(transfer_id, ?action, status = ?updated.status, "transition applied");
        self.notify(&updated, action);
        Ok(updated)
    }

    /// The terminal approval. Order matters:
    ///
    /// 1. claim the effect marker via compare-and-swap — racing approvers
    ///    lose here, so the effector is called at most once per transfer;
    /// 2. apply the player reassignment synchronously;
    /// 3. commit `Approved` + `Applied` in one swap, then append the entry.
    ///
    /// A recoverable effector failure rolls the claim back; the status other
    /// readers see never changed, and the caller may retry the action.
    fn commit_with_effect(
        &self,
        raw: &sled::IVec,
        request: &TransferRequest,
        action: Action,
        actor: Role,
        comment: Option<String>,
    ) -> Result<TransferRequest, TransferError> {
        let mut claimed = request.clone();
        claimed.effect = EffectState::Claimed;
        let claimed_bytes = self.swap(raw, &claimed)?;

        if let Err(err) =
            self.effector
                .apply(&claimed.transfer_id, &claimed.player_id, &claimed.to_club_id)
        {
            self.swap(&claimed_bytes, request)?;
            return Err(err.into());
        }

        let mut approved = claimed.clone();
        approved.status = TransferStatus::Approved;
        approved.effect = EffectState::Applied;
        if action == Action::Certify {
            approved.certification = CertificationStatus::Approved;
        }
        self.swap(&claimed_bytes, &approved)?;
        self.append_entry(&approved, actor, Decision::Approved, comment)?;
        Ok(approved)
    }

    /// Append one decision, hash-linked to the previous entry. Only the CAS
    /// winner reaches this, so appends are never contended.
    fn append_entry(
        &self,
        request: &TransferRequest,
        role: Role,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<LedgerEntry, TransferError> {
        let (seq, prev) = match self.last_entry(&request.transfer_id)? {
            Some(last) => {
                let (hash, _) = last.build()?;
                (last.seq + 1, Some(hash))
            }
            None => (0, None),
        };

        let entry = LedgerEntry::new(
            request.transfer_id.clone(),
            seq,
            role,
            decision,
            comment,
            prev,
        );
        let (_, cbor) = entry.build()?;
        self.ledger
            .insert(ledger_key(&request.transfer_id, seq), cbor)?;
        Ok(entry)
    }

    fn last_entry(&self, transfer_id: &str) -> Result<Option<LedgerEntry>, TransferError> {
        match self.ledger.scan_prefix(ledger_prefix(transfer_id)).last() {
            Some(kv) => {
                let (_, value) = kv?;
                Ok(Some(minicbor::decode(&value)?))
            }
            None => Ok(None),
        }
    }

    fn notify(&self, request: &TransferRequest, action: Action) {
        if let Err(err) = self.sink.transition(request, action) {
            warn!(
                transfer_id = %request.transfer_id,
                ?action,
                "transition notification failed: {err:#}"
            );
        }
    }
}

fn ledger_prefix(transfer_id: &str) -> Vec<u8> {
    let mut prefix = transfer_id.as_bytes().to_vec();
    prefix.push(b'/');
    prefix
}

// big-endian seq keeps lexicographic key order equal to decision order
fn ledger_key(transfer_id: &str, seq: u32) -> Vec<u8> {
    let mut key = ledger_prefix(transfer_id);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}
