//! State machine trait for lifecycle status enums.

use super::ValidationError;

/// A status enum whose legal transitions are declared up front.
///
/// Implementors list the allowed edges once; callers go through
/// [`StateMachine::transition_to`] so an illegal edge can never be written.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Closed,
        Open,
        Welded,
    }

    impl StateMachine for Door {
        fn can_transition_to(&self, target: &Self) -> bool {
            self.valid_transitions().contains(target)
        }

        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Door::Closed => vec![Door::Open, Door::Welded],
                Door::Open => vec![Door::Closed],
                Door::Welded => vec![],
            }
        }
    }

    #[test]
    fn transition_to_follows_declared_edges() {
        assert_eq!(Door::Closed.transition_to(Door::Open), Ok(Door::Open));
        assert!(Door::Open.transition_to(Door::Welded).is_err());
    }

    #[test]
    fn state_without_edges_is_terminal() {
        assert!(Door::Welded.is_terminal());
        assert!(!Door::Closed.is_terminal());
    }
}
