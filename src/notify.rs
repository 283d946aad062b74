//! Fire-and-forget transition notifications
//!
//! The surrounding system wires a sink here (mail, in-app, audit feed). A
//! failing sink is logged and ignored; it never rolls a transition back.
use std::sync::Mutex;

use super::request::TransferRequest;
use super::workflow::Action;

pub trait TransitionSink: Send + Sync {
    fn transition(&self, request: &TransferRequest, action: Action) -> anyhow::Result<()>;
}

/// Default sink: swallow everything.
#[derive(Default)]
pub struct NoopSink;

impl TransitionSink for NoopSink {
    fn transition(&self, _request: &TransferRequest, _action: Action) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records every notified transition; used in tests to assert the sink is
/// informed once per successful transition.
#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<(String, Action)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn seen(&self) -> Vec<(String, Action)> {
        self.seen.lock().expect("sink lock poisoned").clone()
    }
}

impl TransitionSink for RecordingSink {
    fn transition(&self, request: &TransferRequest, action: Action) -> anyhow::Result<()> {
        self.seen
            .lock()
            .expect("sink lock poisoned")
            .push((request.transfer_id.clone(), action));
        Ok(())
    }
}
