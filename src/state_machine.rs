//! Recording lifecycle state machine
//!
//! All capture state changes go through `reduce()`, which returns the next
//! state or the reason the request was rejected. Rejections never change
//! state; callers surface them as warnings.
//!
//! ```text
//! Idle --start--> Recording --stop--> Stopped
//! Stopped --start--> Recording          (prior in-memory asset discarded)
//! Recording --start--> rejected         (AlreadyRecording)
//! Idle/Stopped --stop--> rejected       (NotRecording)
//! ```

use serde::Serialize;

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureState {
    #[default]
    Idle,
    Recording,
    Stopped,
}

impl CaptureState {
    pub fn is_recording(&self) -> bool {
        matches!(self, CaptureState::Recording)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Recording => "recording",
            CaptureState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User intents that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AlreadyRecording,
    NotRecording,
}

/// Reducer: (state, action) -> next state, or a rejection with no state change.
pub fn reduce(state: CaptureState, action: Action) -> Result<CaptureState, Rejection> {
    use Action::*;
    use CaptureState::*;

    match (state, action) {
        (Idle, Start) | (Stopped, Start) => Ok(Recording),
        (Recording, Start) => Err(Rejection::AlreadyRecording),
        (Recording, Stop) => Ok(Stopped),
        (Idle, Stop) | (Stopped, Stop) => Err(Rejection::NotRecording),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_start_transitions_to_recording() {
        assert_eq!(
            reduce(CaptureState::Idle, Action::Start),
            Ok(CaptureState::Recording)
        );
    }

    #[test]
    fn recording_stop_transitions_to_stopped() {
        assert_eq!(
            reduce(CaptureState::Recording, Action::Stop),
            Ok(CaptureState::Stopped)
        );
    }

    #[test]
    fn stopped_start_records_again() {
        assert_eq!(
            reduce(CaptureState::Stopped, Action::Start),
            Ok(CaptureState::Recording)
        );
    }

    #[test]
    fn start_while_recording_is_rejected() {
        assert_eq!(
            reduce(CaptureState::Recording, Action::Start),
            Err(Rejection::AlreadyRecording)
        );
    }

    #[test]
    fn stop_without_recording_is_rejected() {
        assert_eq!(
            reduce(CaptureState::Idle, Action::Stop),
            Err(Rejection::NotRecording)
        );
        assert_eq!(
            reduce(CaptureState::Stopped, Action::Stop),
            Err(Rejection::NotRecording)
        );
    }

    #[test]
    fn state_serializes_camel_case() {
        let json = serde_json::to_string(&CaptureState::Recording).unwrap();
        assert_eq!(json, "\"recording\"");
    }
}
