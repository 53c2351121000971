use std::fmt;

/// The single discrete application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppState {
    #[default]
    Tree,
    Explode,
    Photo,
    Heart,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::Explode => "explode",
            Self::Photo => "photo",
            Self::Heart => "heart",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: AppState,
    pub to: AppState,
}

impl StateChange {
    pub fn entered_heart(&self) -> bool {
        self.to == AppState::Heart && self.from != AppState::Heart
    }

    pub fn left_heart(&self) -> bool {
        self.from == AppState::Heart && self.to != AppState::Heart
    }
}

/// Holds the application state; transitions are instantaneous assignments
/// and only an actual change of value is reported as an edge.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: AppState,
}

impl StateMachine {
    pub fn current(&self) -> AppState {
        self.state
    }

    pub fn set(&mut self, to: AppState) -> Option<StateChange> {
        if self.state == to {
            return None;
        }
        let ch = StateChange {
            from: self.state,
            to,
        };
        self.state = to;
        Some(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_tree() {
        let sm = StateMachine::default();
        assert_eq!(sm.current(), AppState::Tree);
    }

    #[test]
    fn repeated_state_is_not_an_edge() {
        let mut sm = StateMachine::default();
        let ch = sm.set(AppState::Heart).unwrap();
        assert!(ch.entered_heart());
        assert!(sm.set(AppState::Heart).is_none());
        let ch = sm.set(AppState::Tree).unwrap();
        assert!(ch.left_heart());
        assert!(!ch.entered_heart());
    }
}
