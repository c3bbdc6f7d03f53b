use super::{PresenceIntent, PresenceState};
use crate::error::LocationError;
use crate::geolocation::PositionEvent;
use crate::model::LocationFix;
use tracing::debug;

/// Inputs accepted by the state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum PresenceInput {
    /// The user toggled sharing on or off
    Intent(bool),
    /// An item from the geolocation watch
    Position(PositionEvent),
}

/// Side effects requested by a transition, in execution order.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    StartWatch,
    StopWatch,
    /// Stop and start the watch after a transient timeout
    RestartWatch,
    /// First confirmed fix: write now and start the timer
    PublishNow(LocationFix),
    /// Newer fix for the next periodic write
    UpdateFix(LocationFix),
    /// Cancel the timer and clear the stored location
    ClearStore,
    /// Surface a location error to the UI
    NotifyError(LocationError),
}

/// Presence transition table for one user session.
///
/// | state       | intent on       | fix              | error                  | intent off        |
/// |-------------|-----------------|------------------|------------------------|-------------------|
/// | Off         | AwaitingFix     | ignored          | ignored                | no-op             |
/// | AwaitingFix | no-op           | Active, publish  | Error, clear, notify   | Off, stop watch   |
/// | Active      | no-op           | update cached    | Error, clear, notify   | Off, stop, clear  |
/// | Error       | AwaitingFix     | ignored          | ignored                | Off               |
///
/// A `FixTimeout` restarts the watch instead, up to `max_timeout_retries`
/// consecutive times.
#[derive(Clone, Debug)]
pub struct PresenceMachine {
    state: PresenceState,
    intent: PresenceIntent,
    cached_fix: Option<LocationFix>,
    timeout_retries: u32,
    max_timeout_retries: u32,
}

impl PresenceMachine {
    pub fn new(max_timeout_retries: u32) -> Self {
        Self {
            state: PresenceState::Off,
            intent: PresenceIntent::default(),
            cached_fix: None,
            timeout_retries: 0,
            max_timeout_retries,
        }
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    pub fn intent(&self) -> PresenceIntent {
        self.intent
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Latest accepted fix; only held while `Active`.
    pub fn cached_fix(&self) -> Option<&LocationFix> {
        self.cached_fix.as_ref()
    }

    /// Apply one input and return the effects to run.
    pub fn apply(&mut self, input: PresenceInput) -> Vec<Effect> {
        match input {
            PresenceInput::Intent(true) => self.intent_on(),
            PresenceInput::Intent(false) => self.intent_off(),
            PresenceInput::Position(Ok(fix)) => self.fix(fix),
            PresenceInput::Position(Err(error)) => self.error(error),
        }
    }

    /// Force the quiescent state, used on session teardown.
    pub fn reset(&mut self) {
        self.state = PresenceState::Off;
        self.intent.desired = false;
        self.cached_fix = None;
        self.timeout_retries = 0;
    }

    fn intent_on(&mut self) -> Vec<Effect> {
        self.intent.desired = true;
        match self.state {
            PresenceState::Off | PresenceState::Error(_) => {
                self.state = PresenceState::AwaitingFix;
                self.timeout_retries = 0;
                vec![Effect::StartWatch]
            }
            PresenceState::AwaitingFix | PresenceState::Active => vec![],
        }
    }

    fn intent_off(&mut self) -> Vec<Effect> {
        self.intent.desired = false;
        let effects = match self.state {
            PresenceState::Off => return vec![],
            PresenceState::AwaitingFix => vec![Effect::StopWatch],
            PresenceState::Active => vec![Effect::StopWatch, Effect::ClearStore],
            PresenceState::Error(_) => vec![],
        };
        self.state = PresenceState::Off;
        self.cached_fix = None;
        self.timeout_retries = 0;
        effects
    }

    fn fix(&mut self, fix: LocationFix) -> Vec<Effect> {
        match self.state {
            PresenceState::AwaitingFix => {
                self.state = PresenceState::Active;
                self.cached_fix = Some(fix);
                self.timeout_retries = 0;
                vec![Effect::PublishNow(fix)]
            }
            PresenceState::Active => {
                if !fix.supersedes(self.cached_fix.as_ref()) {
                    debug!(
                        fix_timestamp = %fix.timestamp,
                        "Discarding stale or duplicate location fix"
                    );
                    return vec![];
                }
                self.cached_fix = Some(fix);
                self.timeout_retries = 0;
                vec![Effect::UpdateFix(fix)]
            }
            PresenceState::Off | PresenceState::Error(_) => {
                debug!(state = %self.state, "Ignoring location fix outside an active session");
                vec![]
            }
        }
    }

    fn error(&mut self, error: LocationError) -> Vec<Effect> {
        match self.state {
            PresenceState::AwaitingFix | PresenceState::Active => {
                if error.is_transient() && self.timeout_retries < self.max_timeout_retries {
                    self.timeout_retries += 1;
                    debug!(retry = self.timeout_retries, "Transient location error, restarting watch");
                    return vec![Effect::RestartWatch];
                }
                self.state = PresenceState::Error(error.clone());
                self.intent.desired = false;
                self.cached_fix = None;
                self.timeout_retries = 0;
                vec![Effect::StopWatch, Effect::ClearStore, Effect::NotifyError(error)]
            }
            PresenceState::Off | PresenceState::Error(_) => {
                debug!(state = %self.state, error = %error, "Ignoring location error outside an active session");
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fix_at;

    fn on(m: &mut PresenceMachine) -> Vec<Effect> {
        m.apply(PresenceInput::Intent(true))
    }

    fn off(m: &mut PresenceMachine) -> Vec<Effect> {
        m.apply(PresenceInput::Intent(false))
    }

    fn fix(m: &mut PresenceMachine, f: LocationFix) -> Vec<Effect> {
        m.apply(PresenceInput::Position(Ok(f)))
    }

    fn err(m: &mut PresenceMachine, e: LocationError) -> Vec<Effect> {
        m.apply(PresenceInput::Position(Err(e)))
    }

    fn active_machine() -> PresenceMachine {
        let mut m = PresenceMachine::new(2);
        on(&mut m);
        fix(&mut m, fix_at(37.77, -122.41, 0));
        m
    }

    #[test]
    fn test_initial_state_is_off() {
        let m = PresenceMachine::new(2);
        assert_eq!(m.state(), &PresenceState::Off);
        assert!(!m.intent().desired);
        assert!(!m.is_ready());
    }

    #[test]
    fn test_intent_on_starts_watch() {
        let mut m = PresenceMachine::new(2);
        assert_eq!(on(&mut m), vec![Effect::StartWatch]);
        assert_eq!(m.state(), &PresenceState::AwaitingFix);
        assert!(m.intent().desired);
        assert!(!m.is_ready());

        // Re-entering does not double-start
        assert!(on(&mut m).is_empty());
    }

    #[test]
    fn test_first_fix_activates_and_publishes() {
        let mut m = PresenceMachine::new(2);
        on(&mut m);
        let f = fix_at(37.77, -122.41, 0);

        assert_eq!(fix(&mut m, f), vec![Effect::PublishNow(f)]);
        assert_eq!(m.state(), &PresenceState::Active);
        assert!(m.is_ready());
        assert_eq!(m.cached_fix(), Some(&f));
        assert!(on(&mut m).is_empty());
    }

    #[test]
    fn test_newer_fix_updates_cache() {
        let mut m = active_machine();
        let newer = fix_at(1.0, 1.0, 5);

        assert_eq!(fix(&mut m, newer), vec![Effect::UpdateFix(newer)]);
        assert_eq!(m.cached_fix(), Some(&newer));
        assert!(m.is_ready());
    }

    #[test]
    fn test_out_of_order_fix_is_discarded() {
        let mut m = PresenceMachine::new(2);
        on(&mut m);
        let t1 = fix_at(1.0, 1.0, 1);
        let t2 = fix_at(2.0, 2.0, 2);

        fix(&mut m, t2);
        assert!(fix(&mut m, t1).is_empty());
        assert_eq!(m.cached_fix(), Some(&t2));

        // Duplicates are dropped too
        assert!(fix(&mut m, t2).is_empty());
    }

    #[test]
    fn test_intent_off_from_awaiting_stops_watch_only() {
        let mut m = PresenceMachine::new(2);
        on(&mut m);
        assert_eq!(off(&mut m), vec![Effect::StopWatch]);
        assert_eq!(m.state(), &PresenceState::Off);
        assert!(off(&mut m).is_empty());
    }

    #[test]
    fn test_intent_off_from_active_stops_and_clears() {
        let mut m = active_machine();
        assert_eq!(off(&mut m), vec![Effect::StopWatch, Effect::ClearStore]);
        assert_eq!(m.state(), &PresenceState::Off);
        assert!(m.cached_fix().is_none());
        assert!(!m.intent().desired);
    }

    #[test]
    fn test_permission_denied_while_active() {
        let mut m = active_machine();
        let effects = err(&mut m, LocationError::PermissionDenied);

        assert_eq!(
            effects,
            vec![
                Effect::StopWatch,
                Effect::ClearStore,
                Effect::NotifyError(LocationError::PermissionDenied)
            ]
        );
        assert_eq!(m.state(), &PresenceState::Error(LocationError::PermissionDenied));
        assert!(!m.intent().desired);
        assert!(!m.is_ready());
    }

    #[test]
    fn test_error_while_awaiting_fix_clears_and_notifies() {
        let mut m = PresenceMachine::new(2);
        on(&mut m);
        let effects = err(&mut m, LocationError::PositionUnavailable("no gps".into()));

        assert!(effects.contains(&Effect::ClearStore));
        assert!(matches!(m.state(), PresenceState::Error(_)));
        assert!(!m.intent().desired);
    }

    #[test]
    fn test_repeated_errors_after_error_are_ignored() {
        let mut m = active_machine();
        err(&mut m, LocationError::PermissionDenied);
        assert!(err(&mut m, LocationError::PermissionDenied).is_empty());
        assert!(fix(&mut m, fix_at(0.0, 0.0, 99)).is_empty());
        assert!(matches!(m.state(), PresenceState::Error(_)));
    }

    #[test]
    fn test_error_then_intent_on_retries() {
        let mut m = active_machine();
        err(&mut m, LocationError::PermissionDenied);

        assert_eq!(on(&mut m), vec![Effect::StartWatch]);
        assert_eq!(m.state(), &PresenceState::AwaitingFix);
    }

    #[test]
    fn test_error_then_intent_off_is_quiet() {
        let mut m = active_machine();
        err(&mut m, LocationError::PermissionDenied);

        assert!(off(&mut m).is_empty());
        assert_eq!(m.state(), &PresenceState::Off);
    }

    #[test]
    fn test_fix_timeout_retries_then_errors() {
        let mut m = PresenceMachine::new(2);
        on(&mut m);

        assert_eq!(err(&mut m, LocationError::FixTimeout), vec![Effect::RestartWatch]);
        assert_eq!(err(&mut m, LocationError::FixTimeout), vec![Effect::RestartWatch]);
        assert_eq!(m.state(), &PresenceState::AwaitingFix);

        let effects = err(&mut m, LocationError::FixTimeout);
        assert!(effects.contains(&Effect::NotifyError(LocationError::FixTimeout)));
        assert_eq!(m.state(), &PresenceState::Error(LocationError::FixTimeout));
    }

    #[test]
    fn test_fix_resets_timeout_budget() {
        let mut m = PresenceMachine::new(1);
        on(&mut m);
        assert_eq!(err(&mut m, LocationError::FixTimeout), vec![Effect::RestartWatch]);
        fix(&mut m, fix_at(1.0, 1.0, 1));

        assert_eq!(err(&mut m, LocationError::FixTimeout), vec![Effect::RestartWatch]);
        assert!(m.is_ready());
    }

    #[test]
    fn test_late_fix_after_off_is_ignored() {
        let mut m = active_machine();
        off(&mut m);
        assert!(fix(&mut m, fix_at(9.0, 9.0, 100)).is_empty());
        assert_eq!(m.state(), &PresenceState::Off);
    }

    #[test]
    fn test_ready_iff_active_over_mixed_sequence() {
        let mut m = PresenceMachine::new(1);
        let inputs = vec![
            PresenceInput::Intent(true),
            PresenceInput::Position(Err(LocationError::FixTimeout)),
            PresenceInput::Position(Ok(fix_at(1.0, 1.0, 1))),
            PresenceInput::Position(Ok(fix_at(1.0, 1.0, 0))),
            PresenceInput::Intent(false),
            PresenceInput::Intent(true),
            PresenceInput::Position(Err(LocationError::PermissionDenied)),
            PresenceInput::Intent(true),
            PresenceInput::Position(Ok(fix_at(2.0, 2.0, 2))),
        ];
        for input in inputs {
            m.apply(input);
            assert_eq!(m.is_ready(), m.state() == &PresenceState::Active);
        }
        assert!(m.is_ready());
    }

    #[test]
    fn test_reset_returns_to_off() {
        let mut m = active_machine();
        m.reset();
        assert_eq!(m.state(), &PresenceState::Off);
        assert!(m.cached_fix().is_none());
        assert!(!m.intent().desired);
    }
}
