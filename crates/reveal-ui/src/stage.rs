//! # Stage
//!
//! An in-process `MotionHost`: a scrollable viewport over a page of
//! `Element`s, with timers, tweens and intersection watches driven by an
//! injected `Clock`.
//!
//! Nothing happens between calls to `tick()`. Each tick:
//!
//! 1. runs every timer that is due, earliest first (ties in creation order),
//! 2. advances every tween and completes the ones that reached their end,
//! 3. delivers threshold crossings to watches.
//!
//! No borrow of the stage is held while user callbacks run, so callbacks may
//! freely schedule, kill or unobserve. A watch delivery queued in step 3 is
//! still delivered if the watch is removed by an earlier callback of the same
//! batch, the same way a browser delivers queued observer entries.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use reveal_core::{AnimatedValue, AnimationSpec, Clock, Rect, Signal, VisualState, signal};
use slotmap::SlotMap;
use smallvec::SmallVec;
use web_time::{Duration, Instant};

use crate::host::{Callback, MotionHost, TimerId, TweenId, WatchCallback, WatchId};
use crate::target::Animatable;

/// A positioned element on the stage.
pub struct Element {
    name: String,
    bounds: Cell<Rect>,
    visual: Cell<VisualState>,
    writes: Cell<usize>,
}

impl Element {
    pub fn new(name: impl Into<String>, bounds: Rect) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            bounds: Cell::new(bounds),
            visual: Cell::new(VisualState::RESTING),
            writes: Cell::new(0),
        })
    }

    pub fn visual(&self) -> VisualState {
        self.visual.get()
    }

    pub fn set_bounds(&self, bounds: Rect) {
        self.bounds.set(bounds);
    }

    /// How many times anything wrote a visual state.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl Animatable for Element {
    fn name(&self) -> &str {
        &self.name
    }
    fn visual_state(&self) -> VisualState {
        self.visual.get()
    }
    fn set_visual_state(&self, state: VisualState) {
        self.visual.set(state);
        self.writes.set(self.writes.get() + 1);
    }
    fn bounds(&self) -> Rect {
        self.bounds.get()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageStats {
    pub timers_set: usize,
    pub timers_cleared: usize,
    pub timers_fired: usize,
    pub tweens_started: usize,
    pub tweens_completed: usize,
    pub tweens_killed: usize,
    pub watches_registered: usize,
    pub watches_released: usize,
    pub watch_deliveries: usize,
}

/// One tween start, as seen by the stage.
#[derive(Clone, Debug, PartialEq)]
pub struct TweenRecord {
    pub target: String,
    /// Time since the stage was created.
    pub at: Duration,
    pub duration: Duration,
}

struct Timer {
    due: Instant,
    seq: u64,
    callback: Callback,
}

struct ActiveTween {
    seq: u64,
    target: Rc<dyn Animatable>,
    value: AnimatedValue<VisualState>,
    on_complete: Callback,
}

struct Watch {
    target: Weak<dyn Animatable>,
    threshold: f32,
    callback: Rc<RefCell<WatchCallback>>,
    crossed: Option<bool>,
}

#[derive(Default)]
struct StageInner {
    timers: SlotMap<TimerId, Timer>,
    tweens: SlotMap<TweenId, ActiveTween>,
    watches: SlotMap<WatchId, Watch>,
    next_seq: u64,
    stats: StageStats,
    tween_log: Vec<TweenRecord>,
}

impl StageInner {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

pub struct Stage {
    clock: Rc<dyn Clock>,
    origin: Instant,
    viewport: Signal<Rect>,
    layout_dirty: Rc<Cell<bool>>,
    inner: RefCell<StageInner>,
}

impl Stage {
    pub fn new(clock: Rc<dyn Clock>, viewport: Rect) -> Rc<Self> {
        let origin = clock.now();
        let viewport = signal(viewport);
        let layout_dirty = Rc::new(Cell::new(true));
        {
            let dirty = layout_dirty.clone();
            viewport.subscribe(move |_| dirty.set(true));
        }
        Rc::new(Self {
            clock,
            origin,
            viewport,
            layout_dirty,
            inner: RefCell::new(StageInner::default()),
        })
    }

    pub fn viewport(&self) -> Rect {
        self.viewport.get()
    }

    pub fn scroll_to(&self, y: f32) {
        self.viewport.update(|v| v.y = y.max(0.0));
    }

    pub fn scroll_by(&self, dy: f32) {
        self.viewport.update(|v| v.y = (v.y + dy).max(0.0));
    }

    /// Call after moving elements so watches re-measure on the next tick.
    pub fn invalidate_layout(&self) {
        self.layout_dirty.set(true);
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.origin)
    }

    pub fn stats(&self) -> StageStats {
        self.inner.borrow().stats
    }

    pub fn tween_log(&self) -> Vec<TweenRecord> {
        self.inner.borrow().tween_log.clone()
    }

    pub fn active_watches(&self) -> usize {
        self.inner.borrow().watches.len()
    }

    pub fn active_tweens(&self) -> usize {
        self.inner.borrow().tweens.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Whether anything is left that a future tick could act on, ignoring
    /// watches (which may wait forever).
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.borrow();
        inner.timers.is_empty() && inner.tweens.is_empty()
    }

    pub fn tick(&self) {
        let now = self.clock.now();
        self.run_due_timers(now);
        self.advance_tweens(now);
        self.deliver_intersections();
    }

    fn run_due_timers(&self, now: Instant) {
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let due = inner
                    .timers
                    .iter()
                    .filter(|(_, t)| t.due <= now)
                    .min_by_key(|(_, t)| (t.due, t.seq))
                    .map(|(id, _)| id);
                let timer = due.and_then(|id| inner.timers.remove(id));
                if timer.is_some() {
                    inner.stats.timers_fired += 1;
                }
                timer
            };
            match next {
                Some(timer) => (timer.callback)(),
                None => break,
            }
        }
    }

    fn advance_tweens(&self, now: Instant) {
        let mut finished: Vec<(u64, Callback)> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            let mut done: SmallVec<[TweenId; 8]> = SmallVec::new();
            for (id, tween) in inner.tweens.iter_mut() {
                let running = tween.value.update(now);
                tween.target.set_visual_state(*tween.value.get());
                if !running {
                    done.push(id);
                }
            }
            for id in done {
                if let Some(tween) = inner.tweens.remove(id) {
                    inner.stats.tweens_completed += 1;
                    finished.push((tween.seq, tween.on_complete));
                }
            }
        }
        finished.sort_by_key(|(seq, _)| *seq);
        for (_, on_complete) in finished {
            on_complete();
        }
    }

    fn deliver_intersections(&self) {
        let viewport = self.viewport.get();
        let remeasure_all = self.layout_dirty.replace(false);

        let mut queued: Vec<(Rc<RefCell<WatchCallback>>, f32)> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            for (_, watch) in inner.watches.iter_mut() {
                if !remeasure_all && watch.crossed.is_some() {
                    continue;
                }
                let fraction = watch
                    .target
                    .upgrade()
                    .map(|t| t.bounds().visible_fraction(&viewport))
                    .unwrap_or(0.0);
                let crossed = fraction > 0.0 && fraction >= watch.threshold;
                if watch.crossed != Some(crossed) {
                    watch.crossed = Some(crossed);
                    queued.push((watch.callback.clone(), fraction));
                }
            }
            inner.stats.watch_deliveries += queued.len();
        }
        for (callback, fraction) in queued {
            log::trace!("intersection delivery: {fraction:.3}");
            (callback.borrow_mut())(fraction);
        }
    }
}

impl MotionHost for Stage {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimerId {
        let due = self.clock.now() + delay;
        let mut inner = self.inner.borrow_mut();
        let seq = inner.seq();
        inner.stats.timers_set += 1;
        inner.timers.insert(Timer { due, seq, callback })
    }

    fn clear_timeout(&self, id: TimerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.timers.remove(id).is_some();
        if removed {
            inner.stats.timers_cleared += 1;
        }
        removed
    }

    fn tween(
        &self,
        target: Rc<dyn Animatable>,
        to: VisualState,
        spec: AnimationSpec,
        on_complete: Callback,
    ) -> TweenId {
        let now = self.clock.now();
        let mut value = AnimatedValue::new(target.visual_state(), spec);
        value.set_target(to, now);

        let mut inner = self.inner.borrow_mut();
        let seq = inner.seq();
        inner.stats.tweens_started += 1;
        inner.tween_log.push(TweenRecord {
            target: target.name().to_string(),
            at: now.saturating_duration_since(self.origin),
            duration: spec.duration,
        });
        log::trace!("tween start: '{}' over {:?}", target.name(), spec.duration);
        inner.tweens.insert(ActiveTween {
            seq,
            target,
            value,
            on_complete,
        })
    }

    fn kill_tween(&self, id: TweenId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.tweens.remove(id).is_some();
        if removed {
            inner.stats.tweens_killed += 1;
        }
        removed
    }

    fn observe(
        &self,
        target: Rc<dyn Animatable>,
        threshold: f32,
        callback: WatchCallback,
    ) -> WatchId {
        let mut inner = self.inner.borrow_mut();
        inner.stats.watches_registered += 1;
        inner.watches.insert(Watch {
            target: Rc::downgrade(&target),
            threshold,
            callback: Rc::new(RefCell::new(callback)),
            crossed: None,
        })
    }

    fn unobserve(&self, id: WatchId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.watches.remove(id).is_some();
        if removed {
            inner.stats.watches_released += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reveal_core::{Easing, TestClock, VisualPatch};

    fn stage() -> (Rc<TestClock>, Rc<Stage>) {
        let clock = Rc::new(TestClock::new());
        let stage = Stage::new(clock.clone(), Rect::new(0.0, 0.0, 1280.0, 800.0));
        (clock, stage)
    }

    #[test]
    fn timers_fire_in_due_order() {
        let (clock, stage) = stage();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (delay, tag) in [(300, "late"), (100, "early"), (100, "early-2")] {
            let order = order.clone();
            stage.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || order.borrow_mut().push(tag)),
            );
        }

        clock.set_elapsed(Duration::from_millis(99));
        stage.tick();
        assert!(order.borrow().is_empty());

        clock.set_elapsed(Duration::from_millis(300));
        stage.tick();
        assert_eq!(*order.borrow(), vec!["early", "early-2", "late"]);
        assert_eq!(stage.stats().timers_fired, 3);
    }

    #[test]
    fn cleared_timer_never_fires() {
        let (clock, stage) = stage();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let id = stage.set_timeout(Duration::from_millis(10), Box::new(move || f.set(true)));
        assert!(stage.clear_timeout(id));
        assert!(!stage.clear_timeout(id));
        clock.advance(Duration::from_millis(50));
        stage.tick();
        assert!(!fired.get());
    }

    #[test]
    fn killed_tween_freezes_mid_flight() {
        let (clock, stage) = stage();
        let el = Element::new("card", Rect::new(0.0, 0.0, 100.0, 100.0));
        el.set_visual_state(VisualPatch::new().opacity(0.0).resolve());
        let completed = Rc::new(Cell::new(false));
        let c = completed.clone();
        let id = stage.tween(
            el.clone(),
            VisualState::RESTING,
            AnimationSpec::tween(Duration::from_millis(500), Easing::Linear),
            Box::new(move || c.set(true)),
        );

        clock.set_elapsed(Duration::from_millis(150));
        stage.tick();
        assert!(stage.kill_tween(id));
        clock.set_elapsed(Duration::from_millis(600));
        stage.tick();

        assert!((el.visual().opacity - 0.3).abs() < 1e-3);
        assert!(!completed.get());
        assert_eq!(stage.stats().tweens_killed, 1);
    }

    #[test]
    fn watch_reports_crossings_only() {
        let (_clock, stage) = stage();
        let el = Element::new("footer", Rect::new(0.0, 1200.0, 1280.0, 200.0));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        stage.observe(el.clone(), 0.5, Box::new(move |f| s.borrow_mut().push(f)));

        stage.tick();
        stage.scroll_to(450.0); // 50px visible, still below threshold
        stage.tick();
        stage.scroll_to(600.0);
        stage.tick();
        stage.scroll_to(700.0);
        stage.tick();

        assert_eq!(*seen.borrow(), vec![0.0, 1.0]);
    }

    #[test]
    fn moved_element_is_remeasured_after_invalidate() {
        let (_clock, stage) = stage();
        let el = Element::new("banner", Rect::new(0.0, 2000.0, 400.0, 100.0));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        stage.observe(el.clone(), 0.5, Box::new(move |f| s.borrow_mut().push(f)));
        stage.tick();

        el.set_bounds(Rect::new(0.0, 300.0, 400.0, 100.0));
        stage.tick();
        assert_eq!(seen.borrow().len(), 1);

        stage.invalidate_layout();
        stage.tick();
        assert_eq!(*seen.borrow(), vec![0.0, 1.0]);
        assert!(stage.is_idle());
    }
}
