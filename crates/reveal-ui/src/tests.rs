#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use reveal_core::{
        AnimationSpec, Easing, Rect, RevealError, Scope, TestClock, VisualPatch, VisualState,
    };
    use slotmap::SlotMap;
    use web_time::{Duration, Instant};

    use crate::host::*;
    use crate::sequencer::*;
    use crate::stage::{Element, Stage};
    use crate::target::{Animatable, TargetRef};

    struct Fixture {
        clock: Rc<TestClock>,
        stage: Rc<Stage>,
        seq: RevealSequencer,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Rc::new(TestClock::new());
            let stage = Stage::new(clock.clone(), Rect::new(0.0, 0.0, 1280.0, 800.0));
            let seq = RevealSequencer::new(stage.clone());
            Self { clock, stage, seq }
        }

        fn at(&self, ms: u64) {
            self.clock.set_elapsed(Duration::from_millis(ms));
            self.stage.tick();
        }

        fn starts(&self) -> Vec<(String, u128)> {
            self.stage
                .tween_log()
                .into_iter()
                .map(|r| (r.target, r.at.as_millis()))
                .collect()
        }
    }

    fn above_fold(name: &str) -> Rc<Element> {
        Element::new(name, Rect::new(0.0, 100.0, 600.0, 100.0))
    }

    fn below_fold(name: &str) -> Rc<Element> {
        Element::new(name, Rect::new(0.0, 1500.0, 600.0, 200.0))
    }

    fn fade_in(target: &Rc<Element>) -> RevealStep {
        RevealStep::new(TargetRef::to(target))
            .from(VisualPatch::fade_from(0.0, 60.0))
            .duration_ms(500)
            .easing(Easing::Linear)
    }

    #[test]
    fn mount_steps_start_in_order_at_cumulative_offsets() {
        let f = Fixture::new();
        let (a, b, c) = (above_fold("a"), above_fold("b"), above_fold("c"));
        let group = RevealGroup::new("hero")
            .step(fade_in(&a))
            .step(fade_in(&b).delay_ms(300))
            .step(fade_in(&c).delay_ms(200));

        let _handle = f.seq.mount(group);
        for t in [0, 299, 300, 499, 500] {
            f.at(t);
        }

        assert_eq!(
            f.starts(),
            vec![("a".into(), 0), ("b".into(), 300), ("c".into(), 500)]
        );
    }

    #[test]
    fn second_step_waits_for_its_offset() {
        let f = Fixture::new();
        let (a, b) = (above_fold("a"), above_fold("b"));
        let handle = f
            .seq
            .mount(RevealGroup::new("hero").step(fade_in(&a)).step(fade_in(&b).delay_ms(300)));

        // Both starting looks are applied at mount.
        assert_eq!(a.visual().opacity, 0.0);
        assert_eq!(b.visual().opacity, 0.0);

        f.at(0);
        assert_eq!(handle.phases(), vec![StepPhase::Animating, StepPhase::Pending]);
        f.at(299);
        assert_eq!(handle.phase(1), Some(StepPhase::Pending));
        assert_eq!(b.visual().opacity, 0.0);
        f.at(300);
        assert_eq!(handle.phase(1), Some(StepPhase::Animating));
        f.at(800);
        assert_eq!(handle.phases(), vec![StepPhase::Settled, StepPhase::Settled]);
        assert!(a.visual().is_resting() && b.visual().is_resting());
    }

    #[test]
    fn scroll_step_fires_exactly_once() {
        let f = Fixture::new();
        let card = below_fold("card");
        let handle = f
            .seq
            .mount(RevealGroup::new("services").step(fade_in(&card).on_scroll(0.5)));

        f.at(0);
        assert_eq!(f.stage.stats().tweens_started, 0);
        assert_eq!(handle.waiting_for_scroll(), 1);

        f.stage.scroll_to(1000.0);
        f.at(16);
        assert_eq!(f.stage.stats().tweens_started, 1);
        assert!(handle.has_fired(0));

        f.at(600);
        assert_eq!(handle.phase(0), Some(StepPhase::Settled));

        // Away and back again.
        f.stage.scroll_to(0.0);
        f.at(700);
        f.stage.scroll_to(1000.0);
        f.at(800);

        let stats = f.stage.stats();
        assert_eq!(stats.tweens_started, 1);
        assert_eq!(stats.watches_registered, 1);
        assert_eq!(stats.watches_released, 1);
        assert!(card.visual().is_resting());
    }

    #[test]
    fn scroll_step_below_threshold_keeps_waiting() {
        let f = Fixture::new();
        let card = below_fold("card");
        let handle = f
            .seq
            .mount(RevealGroup::new("services").step(fade_in(&card).on_scroll(0.5)));

        // 50 of 200px visible.
        f.stage.scroll_to(750.0);
        f.at(0);
        assert_eq!(handle.phase(0), Some(StepPhase::Pending));
        assert!(!handle.has_fired(0));

        f.stage.scroll_to(850.0);
        f.at(10);
        assert_eq!(handle.phase(0), Some(StepPhase::Animating));
    }

    #[test]
    fn scroll_step_waits_its_delay_after_trigger() {
        let f = Fixture::new();
        let card = above_fold("card");
        let handle = f.seq.mount(
            RevealGroup::new("steps").step(fade_in(&card).on_scroll(0.15).delay_ms(200)),
        );

        f.at(50);
        assert!(handle.has_fired(0));
        assert_eq!(handle.phase(0), Some(StepPhase::Pending));
        f.at(249);
        assert!(f.starts().is_empty());
        f.at(250);
        assert_eq!(f.starts(), vec![("card".into(), 250)]);
    }

    #[test]
    fn dispose_before_trigger_cancels() {
        let f = Fixture::new();
        let card = below_fold("card");
        let handle = f
            .seq
            .mount(RevealGroup::new("services").step(fade_in(&card).on_scroll(0.2)));
        f.at(0);

        handle.dispose();
        f.stage.scroll_to(1000.0);
        f.at(100);

        assert_eq!(f.stage.stats().tweens_started, 0);
        assert_eq!(handle.phase(0), Some(StepPhase::Aborted));
        assert_eq!(card.visual().opacity, 0.0);
        assert_eq!(f.stage.active_watches(), 0);
    }

    #[test]
    fn dispose_twice_is_harmless() {
        let f = Fixture::new();
        let (a, b) = (above_fold("a"), below_fold("b"));
        let handle = f.seq.mount(
            RevealGroup::new("about")
                .step(fade_in(&a).delay_ms(100))
                .step(fade_in(&b).on_scroll(0.3)),
        );

        handle.dispose();
        let after_first = f.stage.stats();
        handle.dispose();
        handle.clone().dispose();

        assert_eq!(f.stage.stats(), after_first);
        assert_eq!(after_first.timers_cleared, 1);
        assert_eq!(after_first.watches_released, 1);
        assert!(handle.is_disposed());
        assert!(handle.faults().is_empty());
    }

    #[test]
    fn unmounted_target_never_animates() {
        let f = Fixture::new();
        let ghost = above_fold("ghost");
        let never_attached = TargetRef::new();
        let heading = above_fold("heading");

        let handle = f.seq.mount(
            RevealGroup::new("hero")
                .step(RevealStep::new(never_attached).from(VisualPatch::fade_from(-50.0, 0.0)))
                .step(fade_in(&heading).delay_ms(100)),
        );
        assert_eq!(handle.phase(0), Some(StepPhase::Settled));

        for t in [0, 100, 600] {
            f.at(t);
        }

        assert_eq!(ghost.writes(), 0);
        assert!(ghost.visual().is_resting());
        assert_eq!(f.starts(), vec![("heading".into(), 100)]);
        assert_eq!(handle.phases(), vec![StepPhase::Settled, StepPhase::Settled]);
        assert_eq!(
            handle.faults(),
            vec![RevealError::MissingTarget {
                group: "hero".into(),
                step: 0
            }]
        );
    }

    #[test]
    fn target_detached_before_start_is_skipped() {
        let f = Fixture::new();
        let (a, c) = (above_fold("a"), above_fold("c"));
        let detaching = TargetRef::to(&c);
        let handle = f.seq.mount(
            RevealGroup::new("detach")
                .step(fade_in(&a))
                .step(
                    RevealStep::new(detaching.clone())
                        .from(VisualPatch::new().opacity(0.0))
                        .delay_ms(300),
                ),
        );
        f.at(100);
        detaching.detach();
        f.at(300);

        assert_eq!(handle.phase(1), Some(StepPhase::Settled));
        assert!(matches!(
            handle.faults().as_slice(),
            [RevealError::MissingTarget { step: 1, .. }]
        ));
        assert_eq!(f.starts(), vec![("a".into(), 0)]);
        assert_eq!(f.stage.stats().timers_fired, 1);
    }

    #[test]
    fn attaching_after_mount_does_not_revive_a_step() {
        let f = Fixture::new();
        let b = above_fold("b");
        let late = TargetRef::new();
        let handle = f.seq.mount(
            RevealGroup::new("late").step(
                RevealStep::new(late.clone())
                    .from(VisualPatch::new().opacity(0.0))
                    .delay_ms(300),
            ),
        );
        late.attach(&b);
        f.at(300);

        assert_eq!(handle.phase(0), Some(StepPhase::Settled));
        assert_eq!(b.writes(), 0);
        assert!(f.starts().is_empty());
    }

    #[test]
    fn zero_duration_shows_resting_state() {
        let f = Fixture::new();
        let (a, b) = (above_fold("a"), above_fold("b"));
        let handle = f.seq.mount(
            RevealGroup::new("hero")
                .step(fade_in(&a).duration(Duration::ZERO))
                .step(fade_in(&b)),
        );

        assert!(a.visual().is_resting());
        assert_eq!(handle.phase(0), Some(StepPhase::Settled));
        assert_eq!(handle.phase(1), Some(StepPhase::Animating));
        assert!(matches!(
            handle.faults().as_slice(),
            [RevealError::InvalidParameter { step: 0, .. }]
        ));
        assert_eq!(f.starts(), vec![("b".into(), 0)]);
    }

    #[test]
    fn nan_threshold_shows_resting_state() {
        let f = Fixture::new();
        let card = below_fold("card");
        let handle = f
            .seq
            .mount(RevealGroup::new("x").step(fade_in(&card).on_scroll(f32::NAN)));
        assert!(card.visual().is_resting());
        assert_eq!(handle.phase(0), Some(StepPhase::Settled));
        assert_eq!(f.stage.stats().watches_registered, 0);
    }

    #[test]
    fn out_of_range_threshold_is_clamped() {
        let f = Fixture::new();
        let card = below_fold("card");
        let handle = f
            .seq
            .mount(RevealGroup::new("x").step(fade_in(&card).on_scroll(1.5)));
        assert_eq!(handle.faults().len(), 1);
        assert_eq!(card.visual().opacity, 0.0);

        f.stage.scroll_to(1000.0);
        f.at(0);
        assert_eq!(handle.phase(0), Some(StepPhase::Animating));
    }

    #[test]
    fn unmount_mid_animation_releases_every_watch() {
        let f = Fixture::new();
        let (hero, card, footer) = (above_fold("hero"), below_fold("card"), below_fold("footer"));
        let page = Scope::named("page");
        let section = page.child("home");
        let handle = f.seq.mount_in(
            &section,
            RevealGroup::new("home")
                .step(fade_in(&hero))
                .step(fade_in(&card).on_scroll(0.2))
                .step(fade_in(&footer).on_scroll(0.8)),
        );

        f.at(150);
        page.dispose();

        let stats = f.stage.stats();
        assert_eq!(stats.watches_registered, 2);
        assert_eq!(stats.watches_released, stats.watches_registered);
        assert_eq!(stats.tweens_killed, 1);
        assert!(handle.is_disposed());
        assert_eq!(
            handle.phases(),
            vec![StepPhase::Aborted, StepPhase::Aborted, StepPhase::Aborted]
        );

        let frozen = hero.visual();
        assert!((frozen.opacity - 0.3).abs() < 1e-3);
        f.at(600);
        assert_eq!(hero.visual(), frozen);
    }

    #[test]
    fn dropping_last_handle_releases_host_resources() {
        let f = Fixture::new();
        let card = below_fold("card");
        let handle = f
            .seq
            .mount(RevealGroup::new("x").step(fade_in(&card).on_scroll(0.2)));
        assert_eq!(f.stage.active_watches(), 1);
        drop(handle);
        assert_eq!(f.stage.active_watches(), 0);
    }

    #[test]
    fn phase_table_mid_flight() {
        let f = Fixture::new();
        let (a, b, c) = (above_fold("a"), above_fold("b"), below_fold("c"));
        let handle = f.seq.mount(
            RevealGroup::new("mixed")
                .step(fade_in(&a).duration_ms(100))
                .step(fade_in(&b).duration_ms(1000))
                .step(fade_in(&c).on_scroll(0.5))
                .step(RevealStep::new(TargetRef::new())),
        );
        f.at(100);

        insta::assert_debug_snapshot!(handle.phases(), @r"
        [
            Settled,
            Animating,
            Pending,
            Settled,
        ]
        ");
    }

    #[test]
    fn stagger_chains_mount_steps() {
        let f = Fixture::new();
        let cards: Vec<_> = (1..=3).map(|i| above_fold(&format!("card-{i}"))).collect();
        let template = RevealStep::new(TargetRef::new())
            .from(VisualPatch::new().opacity(0.0).rotation_y(45.0))
            .duration_ms(300)
            .easing("back.out(1.7)".parse().unwrap());
        let group = RevealGroup::new("tools").stagger(
            cards.iter().map(TargetRef::to),
            template,
            Duration::from_millis(100),
        );
        assert_eq!(group.len(), 3);

        let _handle = f.seq.mount(group);
        for t in [0, 100, 200] {
            f.at(t);
        }
        let at: Vec<u128> = f.starts().into_iter().map(|(_, at)| at).collect();
        assert_eq!(at, vec![0, 100, 200]);
    }

    #[test]
    fn stagger_spaces_scroll_steps_after_trigger() {
        let template = RevealStep::new(TargetRef::new()).on_scroll(0.2).delay_ms(50);
        let group = RevealGroup::new("row").stagger(
            (0..3).map(|_| TargetRef::new()),
            template,
            Duration::from_millis(100),
        );
        let delays: Vec<u128> = group.steps().iter().map(|s| s.group_delay.as_millis()).collect();
        assert_eq!(delays, vec![50, 150, 250]);
    }

    #[test]
    fn overlap_positions_convert_to_offsets() {
        let heading = RevealStep::new(TargetRef::new()).duration_ms(2200);
        let desc = RevealStep::new(TargetRef::new()).duration_ms(1200);
        let button = RevealStep::new(TargetRef::new()).duration_ms(900);
        let group = RevealGroup::new("hero")
            .step(heading)
            .then(desc, "-=1.5".parse().unwrap())
            .then(button, "-=2".parse().unwrap());
        let delays: Vec<u128> = group.steps().iter().map(|s| s.group_delay.as_millis()).collect();
        assert_eq!(delays, vec![0, 700, 0]);
    }

    #[test]
    fn huge_relative_offset_saturates() {
        let first = RevealStep::new(TargetRef::new()).duration_ms(1_000_000);
        let group = RevealGroup::new("x")
            .step(first)
            .then(RevealStep::new(TargetRef::new()), Position::RelativeToPreviousEnd(i64::MAX))
            .then(RevealStep::new(TargetRef::new()), Position::RelativeToPreviousEnd(i64::MIN));
        assert_eq!(group.steps()[1].group_delay, Duration::from_millis(i64::MAX as u64));
        assert_eq!(group.steps()[2].group_delay, Duration::ZERO);
    }

    #[test]
    fn position_strings() {
        assert_eq!(
            "<".parse::<Position>(),
            Ok(Position::AfterPreviousStart(Duration::ZERO))
        );
        assert_eq!(
            "<0.25".parse::<Position>(),
            Ok(Position::AfterPreviousStart(Duration::from_millis(250)))
        );
        assert_eq!(
            "+=0.2".parse::<Position>(),
            Ok(Position::RelativeToPreviousEnd(200))
        );
        assert_eq!(
            "-=0.8".parse::<Position>(),
            Ok(Position::RelativeToPreviousEnd(-800))
        );
        assert!("1.5".parse::<Position>().is_err());
        assert!("+=1e30".parse::<Position>().is_err());
        assert!("<1e20".parse::<Position>().is_err());
        assert!("<-0.5".parse::<Position>().is_err());
        assert!("-=abc".parse::<Position>().is_err());
    }

    #[test]
    fn activation_record_fires_once() {
        let mut r = ActivationRecord::default();
        assert!(!r.has_fired());
        assert!(r.fire());
        assert!(!r.fire());
        assert!(r.has_fired());
    }

    /// Host that hands watch callbacks to the test instead of measuring.
    #[derive(Default)]
    struct ManualHost {
        timers: RefCell<SlotMap<TimerId, ()>>,
        tweens: RefCell<SlotMap<TweenId, ()>>,
        watches: RefCell<SlotMap<WatchId, Rc<RefCell<WatchCallback>>>>,
        delivered: RefCell<Vec<Rc<RefCell<WatchCallback>>>>,
        tweens_started: Cell<usize>,
    }

    impl ManualHost {
        fn deliver(&self, index: usize, fraction: f32) {
            let cb = self.delivered.borrow()[index].clone();
            (cb.borrow_mut())(fraction);
        }
    }

    impl MotionHost for ManualHost {
        fn now(&self) -> Instant {
            Instant::now()
        }
        fn set_timeout(&self, _delay: Duration, _callback: Callback) -> TimerId {
            self.timers.borrow_mut().insert(())
        }
        fn clear_timeout(&self, id: TimerId) -> bool {
            self.timers.borrow_mut().remove(id).is_some()
        }
        fn tween(
            &self,
            target: Rc<dyn Animatable>,
            to: VisualState,
            _spec: AnimationSpec,
            _on_complete: Callback,
        ) -> TweenId {
            target.set_visual_state(to);
            self.tweens_started.set(self.tweens_started.get() + 1);
            self.tweens.borrow_mut().insert(())
        }
        fn kill_tween(&self, id: TweenId) -> bool {
            self.tweens.borrow_mut().remove(id).is_some()
        }
        fn observe(
            &self,
            _target: Rc<dyn Animatable>,
            _threshold: f32,
            callback: WatchCallback,
        ) -> WatchId {
            let cb = Rc::new(RefCell::new(callback));
            self.delivered.borrow_mut().push(cb.clone());
            self.watches.borrow_mut().insert(cb)
        }
        fn unobserve(&self, id: WatchId) -> bool {
            self.watches.borrow_mut().remove(id).is_some()
        }
    }

    #[test]
    fn queued_callback_after_dispose_is_ignored() {
        let host = Rc::new(ManualHost::default());
        let seq = RevealSequencer::new(host.clone());
        let card = below_fold("card");
        let handle = seq.mount(RevealGroup::new("x").step(fade_in(&card).on_scroll(0.3)));

        handle.dispose();
        host.deliver(0, 1.0);

        assert_eq!(host.tweens_started.get(), 0);
        assert!(handle.faults().is_empty());
        assert_eq!(handle.phase(0), Some(StepPhase::Aborted));
        assert!(host.watches.borrow().is_empty());
    }

    #[test]
    fn repeated_crossings_start_one_tween() {
        let host = Rc::new(ManualHost::default());
        let seq = RevealSequencer::new(host.clone());
        let card = below_fold("card");
        let handle = seq.mount(RevealGroup::new("x").step(fade_in(&card).on_scroll(0.3)));

        host.deliver(0, 0.1);
        assert_eq!(host.tweens_started.get(), 0);
        host.deliver(0, 0.6);
        host.deliver(0, 0.0);
        host.deliver(0, 0.9);

        assert_eq!(host.tweens_started.get(), 1);
        assert_eq!(handle.phase(0), Some(StepPhase::Animating));
        assert!(host.watches.borrow().is_empty());
    }
}
