//! # Reveal core
//!
//! Lifecycle and motion primitives shared by the reveal sequencer and the
//! hosts that drive it.
//!
//! - `Scope` / `Dispose`: mount scopes and at-most-once cleanups.
//! - `Signal<T>`: observable value with unsubscribe.
//! - `VisualState` / `VisualPatch`: what an element looks like, and how page
//!   authors describe a starting or resting look.
//! - `Easing`, `AnimationSpec`, `AnimatedValue`: tween math.
//! - `Clock`: injected time source (`SystemClock`, `TestClock`).
//!
//! ## Scopes and cleanup
//!
//! ```rust
//! use reveal_core::*;
//! use std::{cell::Cell, rc::Rc};
//!
//! let section = Scope::named("hero");
//! let released = Rc::new(Cell::new(false));
//! section.run(|| {
//!     let released = released.clone();
//!     effect(move || on_unmount(move || released.set(true)));
//! });
//! section.dispose();
//! assert!(released.get());
//! ```
//!
//! There is no global clock and no global plugin registration: whatever needs
//! time receives a `Clock`.

pub mod animation;
pub mod effects;
pub mod error;
pub mod geometry;
pub mod scope;
pub mod signal;
pub mod visual;


pub use animation::{
    AnimatedValue, AnimationSpec, Clock, EaseMode, Easing, Interpolate, ParseEasingError,
    SystemClock, TestClock,
};
pub use effects::*;
pub use error::RevealError;
pub use geometry::*;
pub use scope::*;
pub use signal::*;
pub use visual::*;
