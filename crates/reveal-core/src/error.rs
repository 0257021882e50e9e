use thiserror::Error;

/// Everything that can go wrong while revealing a group. None of these are
/// fatal: the affected step settles at its resting state and the rest of the
/// group carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RevealError {
    #[error("group '{group}' step {step}: target is not mounted")]
    MissingTarget { group: String, step: usize },

    #[error("group '{group}' step {step}: {detail}")]
    InvalidParameter {
        group: String,
        step: usize,
        detail: String,
    },

    /// A trigger or timer fired after the group was disposed.
    #[error("callback arrived after disposal")]
    LateCallback,
}

impl RevealError {
    pub fn step(&self) -> Option<usize> {
        match self {
            RevealError::MissingTarget { step, .. } | RevealError::InvalidParameter { step, .. } => {
                Some(*step)
            }
            RevealError::LateCallback => None,
        }
    }
}
