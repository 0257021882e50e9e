//! # Reveal sequencing
//!
//! A page section describes its entrance as a `RevealGroup`: an ordered list
//! of `RevealStep`s, each naming a target, a starting look, a resting look, a
//! curve and a trigger. `RevealSequencer::mount` applies every starting look
//! at once (so nothing flashes at rest first) and then:
//!
//! - `Trigger::OnMount` steps start on a timeline. Step N starts at the sum
//!   of the `group_delay`s of the mount steps up to and including N.
//! - `Trigger::OnScrollIntoView` steps start when their own target first
//!   crosses `viewport_threshold`, after their own `group_delay`.
//!
//! Every step fires at most once per mount. Each step moves through
//!
//! ```text
//! Pending --trigger--> Animating --last frame--> Settled
//!    \                     \
//!     `--dispose-->         `--dispose--> Aborted (frozen mid-flight)
//! ```
//!
//! Broken steps (missing target, zero duration, unusable threshold) settle
//! at their resting look immediately and never block the rest of the group.
//!
//! ```rust
//! use std::rc::Rc;
//! use reveal_core::*;
//! use reveal_ui::*;
//!
//! let clock = Rc::new(TestClock::new());
//! let stage = Stage::new(clock.clone(), Rect::new(0.0, 0.0, 1280.0, 800.0));
//! let heading = Element::new("heading", Rect::new(0.0, 100.0, 600.0, 80.0));
//!
//! let group = RevealGroup::new("hero").step(
//!     RevealStep::new(TargetRef::to(&heading))
//!         .from(VisualPatch::fade_from(0.0, 80.0))
//!         .duration_ms(600)
//!         .easing("power3.out".parse().unwrap()),
//! );
//! let handle = RevealSequencer::new(stage.clone()).mount(group);
//! assert_eq!(heading.visual().opacity, 0.0);
//!
//! clock.advance(web_time::Duration::from_millis(600));
//! stage.tick();
//! assert!(heading.visual().is_resting());
//! assert_eq!(handle.phase(0), Some(StepPhase::Settled));
//! handle.dispose();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use reveal_core::{
    AnimationSpec, Dispose, Easing, RevealError, Scope, VisualPatch, VisualState, current_scope,
    effect,
};
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::host::{MotionHost, TimerId, TweenId, WatchId};
use crate::target::{Animatable, TargetRef};

pub const DEFAULT_THRESHOLD: f32 = 0.15;
pub const DEFAULT_DURATION: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    #[default]
    #[serde(alias = "mount")]
    OnMount,
    #[serde(alias = "scroll")]
    OnScrollIntoView,
}

/// Reveals never replay within a mount; `Once` is the only policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Repeat {
    #[default]
    Once,
}

#[derive(Clone, Debug)]
pub struct RevealStep {
    pub target: TargetRef,
    pub from: VisualPatch,
    pub to: VisualPatch,
    pub duration: Duration,
    pub easing: Easing,
    pub trigger: Trigger,
    /// Visible fraction of the target that fires a scroll step.
    pub viewport_threshold: f32,
    /// Mount steps: offset after the previous mount step starts.
    /// Scroll steps: wait after the trigger fires.
    pub group_delay: Duration,
    pub repeat: Repeat,
}

impl RevealStep {
    pub fn new(target: TargetRef) -> Self {
        Self {
            target,
            from: VisualPatch::default(),
            to: VisualPatch::default(),
            duration: DEFAULT_DURATION,
            easing: Easing::default(),
            trigger: Trigger::OnMount,
            viewport_threshold: DEFAULT_THRESHOLD,
            group_delay: Duration::ZERO,
            repeat: Repeat::Once,
        }
    }

    pub fn from(mut self, from: VisualPatch) -> Self {
        self.from = from;
        self
    }
    pub fn to(mut self, to: VisualPatch) -> Self {
        self.to = to;
        self
    }
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
    pub fn duration_ms(self, ms: u64) -> Self {
        self.duration(Duration::from_millis(ms))
    }
    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
    pub fn on_mount(mut self) -> Self {
        self.trigger = Trigger::OnMount;
        self
    }
    pub fn on_scroll(mut self, threshold: f32) -> Self {
        self.trigger = Trigger::OnScrollIntoView;
        self.viewport_threshold = threshold;
        self
    }
    pub fn delay(mut self, delay: Duration) -> Self {
        self.group_delay = delay;
        self
    }
    pub fn delay_ms(self, ms: u64) -> Self {
        self.delay(Duration::from_millis(ms))
    }

    /// Same parameters, different element.
    pub fn retarget(&self, target: TargetRef) -> Self {
        Self {
            target,
            ..self.clone()
        }
    }

    fn spec(&self) -> AnimationSpec {
        AnimationSpec::tween(self.duration, self.easing)
    }
}

/// Where a step sits relative to the one declared before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    /// Start this long after the previous step starts (`"<"`, `"<0.2"`).
    AfterPreviousStart(Duration),
    /// Start this many milliseconds after the previous step ends; negative
    /// overlaps (`"-=0.5"`, `"+=0.2"`).
    RelativeToPreviousEnd(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bad timeline position `{0}`")]
pub struct ParsePositionError(pub String);

impl FromStr for Position {
    type Err = ParsePositionError;

    /// Seconds, as page timelines write them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParsePositionError(s.to_string());
        // Offsets must fit in whole milliseconds (and microseconds for `<`).
        let scaled = |v: &str, per_sec: f64| -> Result<f64, ParsePositionError> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(0.0);
            }
            v.parse::<f64>()
                .ok()
                .map(|x| (x * per_sec).round())
                .filter(|x| x.is_finite() && x.abs() < i64::MAX as f64)
                .ok_or_else(err)
        };

        if let Some(rest) = s.strip_prefix('<') {
            let us = scaled(rest, 1_000_000.0)?;
            if us < 0.0 {
                return Err(err());
            }
            Ok(Position::AfterPreviousStart(Duration::from_micros(us as u64)))
        } else if let Some(rest) = s.strip_prefix("-=") {
            Ok(Position::RelativeToPreviousEnd(-(scaled(rest, 1000.0)? as i64)))
        } else if let Some(rest) = s.strip_prefix("+=") {
            Ok(Position::RelativeToPreviousEnd(scaled(rest, 1000.0)? as i64))
        } else {
            Err(err())
        }
    }
}

/// One page section's reveal timeline.
#[derive(Clone, Debug, Default)]
pub struct RevealGroup {
    name: String,
    steps: Vec<RevealStep>,
}

impl RevealGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[RevealStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(mut self, step: RevealStep) -> Self {
        self.push(step);
        self
    }

    pub fn push(&mut self, step: RevealStep) {
        self.steps.push(step);
    }

    /// Converts `position` into the step's `group_delay`.
    pub fn push_at(&mut self, mut step: RevealStep, position: Position) {
        step.group_delay = match position {
            Position::AfterPreviousStart(d) => d,
            Position::RelativeToPreviousEnd(offset_ms) => {
                let prev = self
                    .steps
                    .last()
                    .map(|s| i64::try_from(s.duration.as_millis()).unwrap_or(i64::MAX))
                    .unwrap_or(0);
                Duration::from_millis(prev.saturating_add(offset_ms).max(0) as u64)
            }
        };
        self.steps.push(step);
    }

    pub fn then(mut self, step: RevealStep, position: Position) -> Self {
        self.push_at(step, position);
        self
    }

    /// One step per target from `template`. Mount steps chain `each` apart;
    /// scroll steps wait `template.group_delay + i * each` after their own
    /// trigger, so a row that enters together still cascades.
    pub fn stagger(
        mut self,
        targets: impl IntoIterator<Item = TargetRef>,
        template: RevealStep,
        each: Duration,
    ) -> Self {
        for (i, target) in targets.into_iter().enumerate() {
            let mut step = template.retarget(target);
            step.group_delay = match (template.trigger, i) {
                (_, 0) => template.group_delay,
                (Trigger::OnMount, _) => each,
                (Trigger::OnScrollIntoView, i) => template.group_delay + each * i as u32,
            };
            self.steps.push(step);
        }
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepPhase {
    Pending,
    Animating,
    Settled,
    Aborted,
}

impl StepPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepPhase::Settled | StepPhase::Aborted)
    }
}

/// Whether a step already fired during this mount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivationRecord {
    fired: bool,
}

impl ActivationRecord {
    /// Returns `true` only the first time.
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

struct StepSlot {
    target: TargetRef,
    to: VisualState,
    spec: AnimationSpec,
    trigger: Trigger,
    threshold: f32,
    delay: Duration,
    repeat: Repeat,
    record: ActivationRecord,
    phase: StepPhase,
    timer: Option<TimerId>,
    tween: Option<TweenId>,
    watch: Option<WatchId>,
}

impl StepSlot {
    /// Whether a trigger may start this step now.
    fn activate(&mut self) -> bool {
        match self.repeat {
            Repeat::Once => self.record.fire(),
        }
    }
}

enum Arm {
    At(Duration),
    Watch(Rc<dyn Animatable>),
}

struct GroupState {
    name: String,
    host: Rc<dyn MotionHost>,
    disposed: Cell<bool>,
    slots: RefCell<Vec<StepSlot>>,
    faults: RefCell<Vec<RevealError>>,
}

impl GroupState {
    fn ensure_live(&self) -> Result<(), RevealError> {
        if self.disposed.get() {
            Err(RevealError::LateCallback)
        } else {
            Ok(())
        }
    }

    fn fault(&self, err: RevealError) {
        log::warn!("{err}");
        self.faults.borrow_mut().push(err);
    }

    fn invalid(&self, step: usize, detail: String) -> RevealError {
        RevealError::InvalidParameter {
            group: self.name.clone(),
            step,
            detail,
        }
    }

    /// Validates a step, snaps its target to the starting look and decides
    /// how it will be started. `chain` is the running mount timeline offset.
    fn prepare(
        &self,
        index: usize,
        step: RevealStep,
        chain: &mut Duration,
    ) -> (StepSlot, Option<Arm>) {
        if step.trigger == Trigger::OnMount {
            *chain += step.group_delay;
        }
        let mut slot = StepSlot {
            target: step.target.clone(),
            to: step.to.resolve(),
            spec: step.spec(),
            trigger: step.trigger,
            threshold: step.viewport_threshold,
            delay: step.group_delay,
            repeat: step.repeat,
            record: ActivationRecord::default(),
            phase: StepPhase::Pending,
            timer: None,
            tween: None,
            watch: None,
        };

        let Some(target) = step.target.resolve() else {
            self.fault(RevealError::MissingTarget {
                group: self.name.clone(),
                step: index,
            });
            slot.phase = StepPhase::Settled;
            return (slot, None);
        };

        let mut fallback = None;
        if step.duration.is_zero() {
            fallback = Some("duration must be positive; showing resting state".to_string());
        } else if step.trigger == Trigger::OnScrollIntoView {
            let t = step.viewport_threshold;
            if t.is_nan() {
                fallback = Some("threshold is NaN; showing resting state".to_string());
            } else if !(0.0..=1.0).contains(&t) {
                slot.threshold = t.clamp(0.0, 1.0);
                self.fault(self.invalid(
                    index,
                    format!("threshold {t} clamped to {}", slot.threshold),
                ));
            }
        }

        if let Some(detail) = fallback {
            self.fault(self.invalid(index, detail));
            self.host.set_static(&target, slot.to);
            slot.phase = StepPhase::Settled;
            return (slot, None);
        }

        self.host.set_static(&target, step.from.resolve());
        let arm = match step.trigger {
            Trigger::OnMount => Arm::At(*chain),
            Trigger::OnScrollIntoView => Arm::Watch(target),
        };
        (slot, Some(arm))
    }

    fn arm(self: &Rc<Self>, index: usize, arm: Arm) {
        match arm {
            Arm::At(offset) if offset.is_zero() => self.fire_mount_step(index),
            Arm::At(offset) => {
                let weak = Rc::downgrade(self);
                let id = self.host.set_timeout(
                    offset,
                    Box::new(move || {
                        let Some(state) = weak.upgrade() else { return };
                        if state.ensure_live().is_err() {
                            return;
                        }
                        state.slots.borrow_mut()[index].timer = None;
                        state.fire_mount_step(index);
                    }),
                );
                let mut slots = self.slots.borrow_mut();
                if slots[index].phase == StepPhase::Pending && !slots[index].record.has_fired() {
                    slots[index].timer = Some(id);
                }
            }
            Arm::Watch(target) => {
                let threshold = self.slots.borrow()[index].threshold;
                let weak = Rc::downgrade(self);
                let id = self.host.observe(
                    target,
                    threshold,
                    Box::new(move |fraction| {
                        if let Some(state) = weak.upgrade() {
                            state.on_intersection(index, fraction);
                        }
                    }),
                );
                // A host may deliver synchronously from inside observe().
                let already_fired = {
                    let mut slots = self.slots.borrow_mut();
                    let slot = &mut slots[index];
                    if slot.record.has_fired() || self.disposed.get() {
                        true
                    } else {
                        slot.watch = Some(id);
                        false
                    }
                };
                if already_fired {
                    self.host.unobserve(id);
                }
            }
        }
    }

    fn fire_mount_step(self: &Rc<Self>, index: usize) {
        let first = self.slots.borrow_mut()[index].activate();
        if first {
            self.start(index);
        }
    }

    fn on_intersection(self: &Rc<Self>, index: usize, fraction: f32) {
        if self.ensure_live().is_err() {
            return;
        }
        let (watch, delay) = {
            let mut slots = self.slots.borrow_mut();
            let slot = &mut slots[index];
            if fraction <= 0.0 || fraction < slot.threshold {
                return;
            }
            if !slot.activate() {
                return;
            }
            (slot.watch.take(), slot.delay)
        };
        log::debug!("group '{}' step {index}: in view ({fraction:.2})", self.name);
        if let Some(id) = watch {
            self.host.unobserve(id);
        }

        if delay.is_zero() {
            self.start(index);
            return;
        }
        let weak = Rc::downgrade(self);
        let id = self.host.set_timeout(
            delay,
            Box::new(move || {
                let Some(state) = weak.upgrade() else { return };
                if state.ensure_live().is_err() {
                    return;
                }
                state.slots.borrow_mut()[index].timer = None;
                state.start(index);
            }),
        );
        let mut slots = self.slots.borrow_mut();
        if slots[index].phase == StepPhase::Pending {
            slots[index].timer = Some(id);
        }
    }

    fn start(self: &Rc<Self>, index: usize) {
        let (target, to, spec) = {
            let mut slots = self.slots.borrow_mut();
            let slot = &mut slots[index];
            if slot.phase != StepPhase::Pending {
                return;
            }
            let Some(target) = slot.target.resolve() else {
                slot.phase = StepPhase::Settled;
                drop(slots);
                self.fault(RevealError::MissingTarget {
                    group: self.name.clone(),
                    step: index,
                });
                return;
            };
            slot.phase = StepPhase::Animating;
            (target, slot.to, slot.spec)
        };
        log::debug!(
            "group '{}' step {index}: animating '{}' over {:?}",
            self.name,
            target.name(),
            spec.duration
        );

        let weak = Rc::downgrade(self);
        let id = self.host.tween(
            target,
            to,
            spec,
            Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.on_complete(index);
                }
            }),
        );
        let mut slots = self.slots.borrow_mut();
        if slots[index].phase == StepPhase::Animating {
            slots[index].tween = Some(id);
        }
    }

    fn on_complete(&self, index: usize) {
        if self.ensure_live().is_err() {
            return;
        }
        let mut slots = self.slots.borrow_mut();
        let slot = &mut slots[index];
        slot.tween = None;
        if slot.phase == StepPhase::Animating {
            slot.phase = StepPhase::Settled;
            log::debug!("group '{}' step {index}: settled", self.name);
        }
    }

    fn release(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let mut timers = Vec::new();
        let mut tweens = Vec::new();
        let mut watches = Vec::new();
        for slot in self.slots.borrow_mut().iter_mut() {
            timers.extend(slot.timer.take());
            tweens.extend(slot.tween.take());
            watches.extend(slot.watch.take());
            if !slot.phase.is_terminal() {
                slot.phase = StepPhase::Aborted;
            }
        }
        log::debug!(
            "group '{}' disposed ({} timers, {} tweens, {} watches released)",
            self.name,
            timers.len(),
            tweens.len(),
            watches.len()
        );
        for id in timers {
            self.host.clear_timeout(id);
        }
        for id in tweens {
            self.host.kill_tween(id);
        }
        for id in watches {
            self.host.unobserve(id);
        }
    }
}

impl Drop for GroupState {
    fn drop(&mut self) {
        self.release();
    }
}

/// A mounted group. Clones share the same group; dispose from any of them.
/// Dropping the last clone disposes too.
#[derive(Clone)]
pub struct SequencerHandle {
    state: Rc<GroupState>,
}

impl SequencerHandle {
    /// Cancels pending timers, freezes in-flight tweens and releases every
    /// viewport watch. Idempotent.
    pub fn dispose(&self) {
        self.state.release();
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.get()
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn len(&self) -> usize {
        self.state.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self, index: usize) -> Option<StepPhase> {
        self.state.slots.borrow().get(index).map(|s| s.phase)
    }

    pub fn phases(&self) -> Vec<StepPhase> {
        self.state.slots.borrow().iter().map(|s| s.phase).collect()
    }

    pub fn has_fired(&self, index: usize) -> bool {
        self.state
            .slots
            .borrow()
            .get(index)
            .is_some_and(|s| s.record.has_fired())
    }

    /// Every step is `Settled` or `Aborted`.
    pub fn is_finished(&self) -> bool {
        self.state.slots.borrow().iter().all(|s| s.phase.is_terminal())
    }

    /// Steps still waiting for their target to scroll into view.
    pub fn waiting_for_scroll(&self) -> usize {
        self.state
            .slots
            .borrow()
            .iter()
            .filter(|s| s.trigger == Trigger::OnScrollIntoView && s.phase == StepPhase::Pending)
            .count()
    }

    pub fn faults(&self) -> Vec<RevealError> {
        self.state.faults.borrow().clone()
    }

    pub fn into_dispose(self) -> Dispose {
        Dispose::new(move || self.dispose())
    }
}

impl fmt::Debug for SequencerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencerHandle")
            .field("name", &self.state.name)
            .field("disposed", &self.state.disposed.get())
            .field("phases", &self.phases())
            .finish()
    }
}

/// Drives `RevealGroup`s on the host it was built with.
#[derive(Clone)]
pub struct RevealSequencer {
    host: Rc<dyn MotionHost>,
}

impl RevealSequencer {
    pub fn new(host: Rc<dyn MotionHost>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Rc<dyn MotionHost> {
        &self.host
    }

    pub fn mount(&self, group: RevealGroup) -> SequencerHandle {
        let RevealGroup { name, steps } = group;
        log::debug!("mounting group '{name}' ({} steps)", steps.len());

        let state = Rc::new(GroupState {
            name,
            host: self.host.clone(),
            disposed: Cell::new(false),
            slots: RefCell::new(Vec::with_capacity(steps.len())),
            faults: RefCell::new(Vec::new()),
        });

        // Every starting look is applied before anything is armed.
        let mut chain = Duration::ZERO;
        let mut plan = Vec::new();
        for (index, step) in steps.into_iter().enumerate() {
            let (slot, arm) = state.prepare(index, step, &mut chain);
            state.slots.borrow_mut().push(slot);
            if let Some(arm) = arm {
                plan.push((index, arm));
            }
        }
        for (index, arm) in plan {
            state.arm(index, arm);
        }

        SequencerHandle { state }
    }

    /// Mounts and ties disposal to the current `Scope`.
    pub fn mount_scoped(&self, group: RevealGroup) -> SequencerHandle {
        if current_scope().is_none() {
            log::warn!(
                "mount_scoped('{}') outside of a scope; dispose the handle yourself",
                group.name()
            );
        }
        let handle = self.mount(group);
        let h = handle.clone();
        effect(move || h.into_dispose());
        handle
    }

    /// Mounts and ties disposal to `scope`.
    pub fn mount_in(&self, scope: &Scope, group: RevealGroup) -> SequencerHandle {
        scope.run(|| self.mount_scoped(group))
    }
}
