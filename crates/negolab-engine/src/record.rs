use negolab_models::{EventKind, SessionEvent, SessionOutcome};

use crate::error::RecordSealed;

/// Ordered trace of one session. Append-only until sealed with the terminal
/// outcome.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    events: Vec<SessionEvent>,
    outcome: Option<SessionOutcome>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: SessionEvent) -> Result<(), RecordSealed> {
        if self.is_sealed() {
            return Err(RecordSealed);
        }
        self.events.push(event);
        Ok(())
    }

    pub fn seal(&mut self, outcome: SessionOutcome) -> Result<(), RecordSealed> {
        if self.is_sealed() {
            return Err(RecordSealed);
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn offers(&self) -> usize {
        self.events
            .iter()
            .filter(|event| event.kind == EventKind::Offer)
            .count()
    }
}
