use serde::{Deserialize, Serialize};

/// Viewport width classes, matching the usual 600/900/1200/1536 px breakpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breakpoint {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
}

impl Breakpoint {
    pub const ALL: [Breakpoint; 5] = [
        Breakpoint::Xs,
        Breakpoint::Sm,
        Breakpoint::Md,
        Breakpoint::Lg,
        Breakpoint::Xl,
    ];

    pub const fn min_width(self) -> f32 {
        match self {
            Breakpoint::Xs => 0.0,
            Breakpoint::Sm => 600.0,
            Breakpoint::Md => 900.0,
            Breakpoint::Lg => 1200.0,
            Breakpoint::Xl => 1536.0,
        }
    }

    pub fn for_width(width: f32) -> Breakpoint {
        Self::ALL
            .into_iter()
            .rev()
            .find(|bp| width >= bp.min_width())
            .unwrap_or(Breakpoint::Xs)
    }

    /// `width` is strictly narrower than this breakpoint.
    pub fn is_below(self, width: f32) -> bool {
        width < self.min_width()
    }
}

/// A parameter with a compact (small screen) and a regular variant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Responsive<T> {
    pub compact: T,
    pub regular: T,
}

impl<T: Clone> Responsive<T> {
    pub fn new(compact: T, regular: T) -> Self {
        Self { compact, regular }
    }

    /// The compact variant when the viewport is narrower than `compact_below`.
    pub fn pick(&self, width: f32, compact_below: Breakpoint) -> T {
        if compact_below.is_below(width) {
            self.compact.clone()
        } else {
            self.regular.clone()
        }
    }

    pub fn map<U: Clone>(&self, f: impl Fn(&T) -> U) -> Responsive<U> {
        Responsive {
            compact: f(&self.compact),
            regular: f(&self.regular),
        }
    }
}
