//! The animation capability the sequencer is handed.
//!
//! A host owns time, tweening and viewport observation. Nothing is
//! registered globally: a sequencer works with exactly the host it was
//! constructed with.

use std::rc::Rc;

use reveal_core::{AnimationSpec, VisualState};
use slotmap::new_key_type;
use web_time::{Duration, Instant};

use crate::target::Animatable;

new_key_type! {
    pub struct TimerId;
    pub struct TweenId;
    pub struct WatchId;
}

pub type Callback = Box<dyn FnOnce()>;
/// Receives the target's visible fraction each time it crosses the threshold.
pub type WatchCallback = Box<dyn FnMut(f32)>;

pub trait MotionHost {
    fn now(&self) -> Instant;

    /// Snap `target` to `state` without animating.
    fn set_static(&self, target: &Rc<dyn Animatable>, state: VisualState) {
        target.set_visual_state(state);
    }

    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimerId;
    /// Returns `false` if the timer already fired or was cleared.
    fn clear_timeout(&self, id: TimerId) -> bool;

    /// Tween from the target's current state to `to`. `on_complete` runs
    /// after the final frame, never if the tween is killed.
    fn tween(
        &self,
        target: Rc<dyn Animatable>,
        to: VisualState,
        spec: AnimationSpec,
        on_complete: Callback,
    ) -> TweenId;
    /// Stops a tween where it is.
    fn kill_tween(&self, id: TweenId) -> bool;

    /// The first delivery reports the current fraction; later deliveries
    /// happen when the target crosses `threshold` in either direction.
    fn observe(
        &self,
        target: Rc<dyn Animatable>,
        threshold: f32,
        callback: WatchCallback,
    ) -> WatchId;
    fn unobserve(&self, id: WatchId) -> bool;
}
