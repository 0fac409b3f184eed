//! Subscription lifecycle states.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Where a dashboard subscription currently stands.
///
/// ```text
/// Disconnected ──subscribe──▶ Connecting ──ack──▶ Connected
///      ▲                        │  ▲                 │
///      │                  lost  │  │ backoff         │ lost
///      │                        ▼  │                 ▼
///      └──unsubscribe──── Reconnecting ◀─────────────┘
///                              │ attempts exhausted
///                              ▼
///                            Failed ──refresh ok──▶ Connecting
/// ```
///
/// `PollingFallback` is entered when push is disabled or the server does not
/// offer a stream; refresh then happens through periodic on-demand requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    PollingFallback,
    Failed,
}

impl SubscriptionState {
    /// True while a push connection is open or being opened.
    pub fn is_push_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// True when refresh has to go through on-demand requests.
    pub fn relies_on_requests(&self) -> bool {
        matches!(self, Self::PollingFallback | Self::Failed)
    }
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl StateMachine for SubscriptionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionState::*;
        match self {
            Disconnected => vec![Connecting, PollingFallback],
            Connecting => vec![
                Connecting,
                Connected,
                Reconnecting,
                Failed,
                PollingFallback,
                Disconnected,
            ],
            Connected => vec![Connecting, Reconnecting, Disconnected],
            Reconnecting => vec![Connecting, Failed, Disconnected],
            PollingFallback => vec![Disconnected],
            Failed => vec![Connecting, Disconnected],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionState::*;

    const ALL: [SubscriptionState; 6] = [
        Disconnected,
        Connecting,
        Connected,
        Reconnecting,
        PollingFallback,
        Failed,
    ];

    #[test]
    fn every_state_can_be_torn_down() {
        for state in ALL {
            if state != Disconnected {
                assert!(state.can_transition_to(&Disconnected), "{:?}", state);
            }
        }
    }

    #[test]
    fn no_state_is_terminal() {
        for state in ALL {
            assert!(!state.is_terminal(), "{:?}", state);
        }
    }

    #[test]
    fn failed_only_recovers_through_connecting() {
        assert_eq!(Failed.valid_transitions(), vec![Connecting, Disconnected]);
        assert!(Failed.transition_to(Connected).is_err());
    }

    #[test]
    fn connected_is_only_reached_from_connecting() {
        for state in ALL {
            let reachable = state.can_transition_to(&Connected);
            assert_eq!(reachable, state == Connecting, "{:?}", state);
        }
    }

    #[test]
    fn push_and_request_modes_are_disjoint() {
        for state in ALL {
            assert!(!(state.is_push_active() && state.relies_on_requests()));
        }
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&PollingFallback).unwrap();
        assert_eq!(json, "\"polling_fallback\"");
    }
}
