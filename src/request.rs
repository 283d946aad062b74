//! Transfer request record, draft builder and workflow states
use chrono::{DateTime, TimeZone, Utc};

use super::certification::CertificationStatus;
use super::error::DraftError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    #[n(0)]
    Permanent,
    #[n(1)]
    Loan,
}

/// Workflow state of a transfer request. `status` on the stored record is
/// the denormalized view; the ledger fold must reproduce it (see
/// [`crate::ledger::fold_status`]).
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingOriginClub,
    #[n(2)]
    PendingDestinationClub,
    #[n(3)]
    PendingFederation,
    #[n(4)]
    AwaitingCertification,
    #[n(5)]
    Approved,
    #[n(6)]
    Rejected,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Approved | TransferStatus::Rejected)
    }
}

/// Idempotency marker for the player-reassignment side effect. `Claimed` is
/// only ever held for the duration of one effector call; concurrent writers
/// fail their compare-and-swap against a claimed record.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    #[n(0)]
    Pending,
    #[n(1)]
    Claimed,
    #[n(2)]
    Applied,
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Durable record of one proposed move. Key in the requests tree is
/// `transfer_id`; the value is this struct encoded to CBOR, and every
/// mutation is a compare-and-swap against the exact bytes previously read.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct TransferRequest {
    #[n(0)]
    pub transfer_id: String,
    #[n(1)]
    pub player_id: String,
    #[n(2)]
    pub from_club_id: Option<String>, // None => free agent, origin step skipped
    #[n(3)]
    pub to_club_id: String,
    #[n(4)]
    pub transfer_type: TransferType,
    #[n(5)]
    pub requires_certification: bool, // fixed at submission
    #[n(6)]
    pub fee: u64,
    #[n(7)]
    pub contract_start: TimeStamp<Utc>,
    #[n(8)]
    pub contract_end: TimeStamp<Utc>,
    #[n(9)]
    pub loan_end: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub status: TransferStatus,
    #[n(11)]
    pub rejection_reason: Option<String>, // Some iff status == Rejected
    #[n(12)]
    pub certification: CertificationStatus,
    #[n(13)]
    pub effect: EffectState,
    #[n(14)]
    pub submitted_at: TimeStamp<Utc>,
}

/// Client-side draft of a transfer request. Drafts only exist in memory;
/// submitting validates the draft and persists the record already past the
/// `Draft` state. Discarding the builder is how a draft is rejected.
#[derive(Default, Debug)]
pub struct TransferDraft {
    player_id: Option<String>,
    from_club_id: Option<String>,
    to_club_id: Option<String>,
    transfer_type: Option<TransferType>,
    international: bool,
    fee: u64,
    contract_start: Option<TimeStamp<Utc>>,
    contract_end: Option<TimeStamp<Utc>>,
    loan_end: Option<TimeStamp<Utc>>,
}

impl TransferDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn player(mut self, player_id: &str) -> Self {
        self.player_id = Some(player_id.to_owned());
        self
    }
    pub fn from_club(mut self, club_id: &str) -> Self {
        self.from_club_id = Some(club_id.to_owned());
        self
    }
    pub fn to_club(mut self, club_id: &str) -> Self {
        self.to_club_id = Some(club_id.to_owned());
        self
    }
    pub fn transfer_type(mut self, transfer_type: TransferType) -> Self {
        self.transfer_type = Some(transfer_type);
        self
    }
    /// Cross-federation moves require the certification step. This is fixed
    /// once at submission and never re-derived later.
    pub fn international(mut self, international: bool) -> Self {
        self.international = international;
        self
    }
    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }
    pub fn contract_start(mut self, date: TimeStamp<Utc>) -> Self {
        self.contract_start = Some(date);
        self
    }
    pub fn contract_end(mut self, date: TimeStamp<Utc>) -> Self {
        self.contract_end = Some(date);
        self
    }
    pub fn loan_end(mut self, date: TimeStamp<Utc>) -> Self {
        self.loan_end = Some(date);
        self
    }

    /// Checks all required fields and turns the draft into a record in
    /// `Draft` status. The caller (service layer) runs the submit transition
    /// and persists the result.
    pub fn finalise(self, transfer_id: String) -> Result<TransferRequest, DraftError> {
        let player_id = self.player_id.ok_or(DraftError::MissingPlayer)?;
        let to_club_id = self.to_club_id.ok_or(DraftError::MissingDestination)?;
        if self.from_club_id.as_deref() == Some(to_club_id.as_str()) {
            return Err(DraftError::SameClub);
        }
        let transfer_type = self.transfer_type.ok_or(DraftError::MissingTransferType)?;

        let (contract_start, contract_end) = match (self.contract_start, self.contract_end) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(DraftError::MissingContractWindow),
        };
        if contract_start > contract_end {
            return Err(DraftError::ContractWindowOrder);
        }

        let loan_end = match transfer_type {
            TransferType::Loan => {
                let loan_end = self.loan_end.ok_or(DraftError::MissingLoanEnd)?;
                if loan_end < contract_start || loan_end > contract_end {
                    return Err(DraftError::LoanEndOutsideWindow);
                }
                Some(loan_end)
            }
            TransferType::Permanent => None,
        };

        Ok(TransferRequest {
            transfer_id,
            player_id,
            from_club_id: self.from_club_id,
            to_club_id,
            transfer_type,
            requires_certification: self.international,
            fee: self.fee,
            contract_start,
            contract_end,
            loan_end,
            status: TransferStatus::Draft,
            rejection_reason: None,
            certification: CertificationStatus::NotRequested,
            effect: EffectState::Pending,
            submitted_at: TimeStamp::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> (TimeStamp<Utc>, TimeStamp<Utc>) {
        (
            TimeStamp::new_with(2026, 7, 1, 0, 0, 0),
            TimeStamp::new_with(2028, 6, 30, 0, 0, 0),
        )
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn request_encoding() {
        let (start, end) = window();
        let original = TransferDraft::new()
            .player("player_1abc")
            .from_club("club_1origin")
            .to_club("club_1dest")
            .transfer_type(TransferType::Permanent)
            .fee(4_500_000)
            .contract_start(start)
            .contract_end(end)
            .finalise("transfer_1xyz".into())
            .unwrap();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TransferRequest = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn loan_draft_requires_loan_end() {
        let (start, end) = window();
        let err = TransferDraft::new()
            .player("player_1abc")
            .to_club("club_1dest")
            .transfer_type(TransferType::Loan)
            .contract_start(start)
            .contract_end(end)
            .finalise("transfer_1xyz".into())
            .unwrap_err();

        assert_eq!(err, DraftError::MissingLoanEnd);
    }

    #[test]
    fn draft_rejects_same_origin_and_destination() {
        let (start, end) = window();
        let err = TransferDraft::new()
            .player("player_1abc")
            .from_club("club_1same")
            .to_club("club_1same")
            .transfer_type(TransferType::Permanent)
            .contract_start(start)
            .contract_end(end)
            .finalise("transfer_1xyz".into())
            .unwrap_err();

        assert_eq!(err, DraftError::SameClub);
    }
}
