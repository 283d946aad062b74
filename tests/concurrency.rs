//! Racing approvers against a single request
//!
//! The compare-and-set discipline scopes contention to one transfer: of two
//! racing approvals exactly one commits, the loser observes a stale state,
//! and the effect claim keeps the player reassignment at one invocation no
//! matter how the race interleaves.

use std::sync::{Arc, Barrier};
use std::thread;

use sled::open;
use tempfile::tempdir;
use transfer_approval::{
    effector::InMemoryAssignments,
    error::TransferError,
    ledger::Role,
    request::{TimeStamp, TransferDraft, TransferStatus, TransferType},
    utils,
    workflow::TransferService,
};

fn pending_federation(
    service: &TransferService,
    player_id: &str,
    dest_club: &str,
) -> anyhow::Result<String> {
    let draft = TransferDraft::new()
        .player(player_id)
        .to_club(dest_club)
        .transfer_type(TransferType::Permanent)
        .contract_start(TimeStamp::new_with(2026, 7, 1, 0, 0, 0))
        .contract_end(TimeStamp::new_with(2028, 6, 30, 0, 0, 0));

    let request = service.submit(draft, Role::DestinationClub)?;
    let request = service.approve(&request.transfer_id, Role::DestinationClub, None)?;
    assert_eq!(request.status, TransferStatus::PendingFederation);
    Ok(request.transfer_id)
}

#[test]
fn racing_federation_approvals_resolve_to_one_winner() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("transfers.db"))?);
    db.clear()?;

    let assignments = Arc::new(InMemoryAssignments::new());
    let service = Arc::new(TransferService::new(db, assignments.clone())?);

    let player_id = utils::new_uuid_to_bech32("player_")?;
    let dest_club = utils::new_uuid_to_bech32("club_")?;
    let transfer_id = pending_federation(&service, &player_id, &dest_club)?;

    // a double-click: two staff members both hit approve
    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        let transfer_id = transfer_id.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            service.approve(&transfer_id, Role::Federation, None)
        }));
    }

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("approver thread panicked"))
        .collect();

    let wins = results.iter().filter(|result| result.is_ok()).count();
    let stale = results
        .iter()
        .filter(|result| matches!(result, Err(TransferError::Stale(_))))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(stale, 1);

    let request = service.get_status(&transfer_id)?;
    assert_eq!(request.status, TransferStatus::Approved);

    // one federation decision on the ledger, one player move
    let entries = service.get_ledger(&transfer_id)?;
    let federation_entries = entries
        .iter()
        .filter(|entry| entry.role == Role::Federation)
        .count();
    assert_eq!(federation_entries, 1);
    assert_eq!(assignments.applied_count(), 1);
    assert_eq!(assignments.club_of(&player_id).as_deref(), Some(dest_club.as_str()));

    Ok(())
}

#[test]
fn racing_approve_and_reject_leave_one_outcome() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("transfers.db"))?);
    db.clear()?;

    let assignments = Arc::new(InMemoryAssignments::new());
    let service = Arc::new(TransferService::new(db, assignments.clone())?);

    let player_id = utils::new_uuid_to_bech32("player_")?;
    let dest_club = utils::new_uuid_to_bech32("club_")?;
    let transfer_id = pending_federation(&service, &player_id, &dest_club)?;

    let barrier = Arc::new(Barrier::new(2));

    let approve = {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        let transfer_id = transfer_id.clone();
        thread::spawn(move || {
            barrier.wait();
            service.approve(&transfer_id, Role::Federation, None)
        })
    };
    let reject = {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        let transfer_id = transfer_id.clone();
        thread::spawn(move || {
            barrier.wait();
            service.reject(&transfer_id, Role::Federation, "incomplete paperwork")
        })
    };

    let outcomes = [
        approve.join().expect("approver thread panicked"),
        reject.join().expect("rejecter thread panicked"),
    ];
    assert_eq!(outcomes.iter().filter(|result| result.is_ok()).count(), 1);

    let request = service.get_status(&transfer_id)?;
    let entries = service.get_ledger(&transfer_id)?;
    match request.status {
        TransferStatus::Approved => {
            assert_eq!(assignments.applied_count(), 1);
            assert!(request.rejection_reason.is_none());
        }
        TransferStatus::Rejected => {
            assert_eq!(assignments.applied_count(), 0);
            assert_eq!(request.rejection_reason.as_deref(), Some("incomplete paperwork"));
        }
        other => panic!("transfer ended in a non-terminal state: {other:?}"),
    }
    // either way: exactly one federation decision
    assert_eq!(
        entries.iter().filter(|entry| entry.role == Role::Federation).count(),
        1
    );

    Ok(())
}
