//! Operation slot state machine.
//!
//! Pure transition table over the single per-session operation slot. The
//! controller applies these transitions from one task only; nothing here
//! touches the network or the UI.

use crate::model::{FailureKind, OperationKind, OperationOutcome, OperationState};
use std::time::Instant;

/// The orchestrator lock: at most one operation's state machine may be
/// `InFlight` at a time, and `NeedsElevation` holds the slot until the user
/// resolves it.
#[derive(Debug)]
pub(crate) struct OperationSlot {
    state: OperationState,
}

impl OperationSlot {
    pub fn new() -> Self {
        Self {
            state: OperationState::Idle,
        }
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    /// Starts are legal from `Idle`, `Succeeded` and `Failed` only.
    pub fn can_start(&self) -> bool {
        !matches!(
            self.state,
            OperationState::InFlight { .. } | OperationState::NeedsElevation { .. }
        )
    }

    pub fn in_flight_kind(&self) -> Option<OperationKind> {
        match self.state {
            OperationState::InFlight { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Claim the slot for `kind`. Returns false (a no-op, not an error) when
    /// the slot is held by an in-flight operation or an unresolved elevation
    /// demand.
    pub fn begin(&mut self, kind: OperationKind) -> bool {
        if !self.can_start() {
            return false;
        }
        self.state = OperationState::InFlight {
            kind,
            started_at: Instant::now(),
        };
        true
    }

    pub fn succeed(&mut self, outcome: OperationOutcome) -> bool {
        let Some(kind) = self.in_flight_kind() else {
            return false;
        };
        self.state = OperationState::Succeeded { kind, outcome };
        true
    }

    pub fn fail(&mut self, failure: FailureKind, message: String) -> bool {
        let Some(kind) = self.in_flight_kind() else {
            return false;
        };
        self.state = OperationState::Failed {
            kind,
            failure,
            message,
        };
        true
    }

    pub fn demand_elevation(&mut self, message: String) -> bool {
        let Some(kind) = self.in_flight_kind() else {
            return false;
        };
        self.state = OperationState::NeedsElevation { kind, message };
        true
    }

    /// User declined the elevation prompt; the slot returns to `Idle`.
    pub fn decline_elevation(&mut self) -> bool {
        match self.state {
            OperationState::NeedsElevation { .. } => {
                self.state = OperationState::Idle;
                true
            }
            _ => false,
        }
    }

    /// User approved the elevation prompt; the slot moves to
    /// `InFlight(Elevate)` and the originally blocked kind is returned so the
    /// caller can surface it for a manual retry later.
    pub fn approve_elevation(&mut self) -> Option<OperationKind> {
        match self.state {
            OperationState::NeedsElevation { kind, .. } => {
                self.state = OperationState::InFlight {
                    kind: OperationKind::Elevate,
                    started_at: Instant::now(),
                };
                Some(kind)
            }
            _ => None,
        }
    }

    /// Terminal return to `Idle` used by the elevation sub-flow (operation
    /// abandoned or handed over to an elevated instance).
    pub fn reset_idle(&mut self) {
        self.state = OperationState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> OperationOutcome {
        OperationOutcome::default()
    }

    #[test]
    fn starts_allowed_from_terminal_states_only() {
        let mut slot = OperationSlot::new();
        assert!(slot.begin(OperationKind::KillCursor));

        // In flight: any further start is a rejected no-op.
        assert!(!slot.begin(OperationKind::Reset));
        assert_eq!(slot.in_flight_kind(), Some(OperationKind::KillCursor));

        assert!(slot.succeed(outcome()));
        assert!(slot.begin(OperationKind::Reset));

        assert!(slot.fail(FailureKind::Transport, "down".into()));
        assert!(slot.begin(OperationKind::GeneratePreview));
    }

    #[test]
    fn at_most_one_in_flight_for_any_start_sequence() {
        let mut slot = OperationSlot::new();
        let kinds = [
            OperationKind::Reset,
            OperationKind::KillCursor,
            OperationKind::DisableAutoUpdate,
            OperationKind::GeneratePreview,
        ];
        let mut started = 0;
        for kind in kinds {
            if slot.begin(kind) {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(slot.in_flight_kind(), Some(OperationKind::Reset));
    }

    #[test]
    fn elevation_demand_holds_the_slot() {
        let mut slot = OperationSlot::new();
        assert!(slot.begin(OperationKind::Reset));
        assert!(slot.demand_elevation("Admin required".into()));
        assert!(!slot.can_start());
        assert!(!slot.begin(OperationKind::KillCursor));
        match slot.state() {
            OperationState::NeedsElevation { kind, message } => {
                assert_eq!(*kind, OperationKind::Reset);
                assert_eq!(message, "Admin required");
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn declined_elevation_releases_the_slot() {
        let mut slot = OperationSlot::new();
        slot.begin(OperationKind::Reset);
        slot.demand_elevation("Admin required".into());
        assert!(slot.decline_elevation());
        assert!(matches!(slot.state(), OperationState::Idle));
        assert!(slot.begin(OperationKind::Reset));
    }

    #[test]
    fn approved_elevation_keeps_the_original_intent() {
        let mut slot = OperationSlot::new();
        slot.begin(OperationKind::Reset);
        slot.demand_elevation("Admin required".into());
        let origin = slot.approve_elevation();
        assert_eq!(origin, Some(OperationKind::Reset));
        assert_eq!(slot.in_flight_kind(), Some(OperationKind::Elevate));
        // Still exclusive while the elevation call runs.
        assert!(!slot.begin(OperationKind::KillCursor));
    }

    #[test]
    fn terminal_transitions_require_in_flight() {
        let mut slot = OperationSlot::new();
        assert!(!slot.succeed(outcome()));
        assert!(!slot.fail(FailureKind::Application, "nope".into()));
        assert!(!slot.demand_elevation("msg".into()));
        assert!(!slot.decline_elevation());
        assert!(slot.approve_elevation().is_none());
    }
}
