//! Certification subprocess for international transfers
//!
//! Cross-federation moves need a certificate from the external certifying
//! authority before they can complete. The subprocess is a request/confirm
//! cycle layered on top of the workflow: `request` flags the record while it
//! sits in `AwaitingCertification`, `confirm` feeds the certify action back
//! into the state machine. Whether a transfer needs this at all is fixed
//! once, at submission.
use super::error::TransferError;
use super::ledger::Role;
use super::request::{EffectState, TransferRequest, TransferStatus};
use super::workflow::{Action, TransferService};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificationStatus {
    #[n(0)]
    NotRequested,
    #[n(1)]
    Requested,
    #[n(2)]
    Approved,
}

/// Façade over the service for the certifying-authority side of the
/// process.
pub struct CertificationDesk<'a> {
    service: &'a TransferService,
}

impl<'a> CertificationDesk<'a> {
    pub fn new(service: &'a TransferService) -> Self {
        Self { service }
    }

    /// Ask the certifying authority for a certificate. Only valid while the
    /// transfer awaits certification and none has been requested yet. Not a
    /// workflow transition: the status does not move.
    pub fn request(&self, transfer_id: &str) -> Result<(), TransferError> {
        let (raw, request) = self.service.load(transfer_id)?;

        if request.effect == EffectState::Claimed {
            return Err(TransferError::Stale(transfer_id.to_owned()));
        }
        if !request.requires_certification {
            return Err(TransferError::Precondition(
                "transfer does not require certification".into(),
            ));
        }
        if request.status != TransferStatus::AwaitingCertification {
            return Err(TransferError::Precondition(format!(
                "certification can only be requested while awaiting certification, not in {:?}",
                request.status
            )));
        }
        if request.certification != CertificationStatus::NotRequested {
            return Err(TransferError::Precondition(
                "certification has already been requested".into(),
            ));
        }

        let mut updated = request.clone();
        updated.certification = CertificationStatus::Requested;
        self.service.swap(&raw, &updated)?;
        Ok(())
    }

    /// The authority granted the certificate: record it and run the certify
    /// transition, which finalises the transfer (and fires the player
    /// reassignment). Confirming without a prior request is an error.
    pub fn confirm(
        &self,
        transfer_id: &str,
        comment: Option<String>,
    ) -> Result<TransferRequest, TransferError> {
        let (_, request) = self.service.load(transfer_id)?;

        if request.certification != CertificationStatus::Requested {
            return Err(TransferError::Precondition(format!(
                "no certification request is outstanding for this transfer (currently {:?})",
                request.certification
            )));
        }

        self.service
            .decide(transfer_id, Action::Certify, Role::CertifyingAuthority, comment)
    }
}

impl TransferService {
    pub fn request_certification(&self, transfer_id: &str) -> Result<(), TransferError> {
        CertificationDesk::new(self).request(transfer_id)
    }

    pub fn confirm_certification(
        &self,
        transfer_id: &str,
        comment: Option<String>,
    ) -> Result<TransferRequest, TransferError> {
        CertificationDesk::new(self).confirm(transfer_id, comment)
    }
}
