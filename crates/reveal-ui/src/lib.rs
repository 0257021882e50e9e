//! Scroll- and load-triggered reveal sequencing.
//!
//! - `target`: the `Animatable` capability and `TargetRef` handles.
//! - `host`: the `MotionHost` capability a sequencer is given.
//! - `stage`: an in-process host with a scrollable viewport.
//! - `sequencer`: `RevealGroup`, `RevealSequencer`, `SequencerHandle`.
//! - `responsive` / `config`: parameter tables for pages.

pub mod config;
pub mod host;
pub mod responsive;
pub mod sequencer;
pub mod stage;
pub mod target;

mod tests;

pub use config::{ConfigError, GroupConfig, PageConfig, StepConfig, TargetRegistry};
pub use host::{Callback, MotionHost, TimerId, TweenId, WatchCallback, WatchId};
pub use responsive::{Breakpoint, Responsive};
pub use sequencer::{
    ActivationRecord, DEFAULT_THRESHOLD, Position, RevealGroup, RevealSequencer, RevealStep,
    Repeat, SequencerHandle, StepPhase, Trigger,
};
pub use stage::{Element, Stage, StageStats, TweenRecord};
pub use target::{Animatable, TargetRef};
