//! Plays the home page reveals on an in-process stage and logs what moves.
//!
//! ```text
//! RUST_LOG=debug cargo run -p landing_page -- 390
//! cargo run -p landing_page -- --live
//! ```
//!
//! A number sets the viewport width in pixels. `--live` plays in real time
//! instead of on a simulated clock.

use std::rc::Rc;

use anyhow::Context;
use reveal_core::{Clock, Rect, Scope, SystemClock, TestClock};
use reveal_ui::{Animatable, Element, PageConfig, RevealSequencer, Stage, TargetRegistry};
use web_time::Duration;

const PAGE: &str = include_str!("../page.json");
const FRAME: Duration = Duration::from_millis(16);

/// Vertical layout of the page, top to bottom.
fn layout(width: f32) -> Vec<(&'static str, Rect)> {
    let col = (width - 96.0).max(240.0);
    let third = (col - 48.0) / 3.0;
    let quarter = (col - 72.0) / 4.0;
    vec![
        ("hero-heading", Rect::new(48.0, 220.0, col, 120.0)),
        ("hero-subtitle", Rect::new(48.0, 360.0, col, 60.0)),
        ("hero-button", Rect::new(48.0, 460.0, 200.0, 56.0)),
        ("services-title", Rect::new(48.0, 1000.0, col, 80.0)),
        ("service-1", Rect::new(48.0, 1120.0, third, 320.0)),
        ("service-2", Rect::new(72.0 + third, 1120.0, third, 320.0)),
        ("service-3", Rect::new(96.0 + 2.0 * third, 1120.0, third, 320.0)),
        ("tool-1", Rect::new(48.0, 1800.0, quarter, 160.0)),
        ("tool-2", Rect::new(72.0 + quarter, 1800.0, quarter, 160.0)),
        ("tool-3", Rect::new(96.0 + 2.0 * quarter, 1800.0, quarter, 160.0)),
        ("tool-4", Rect::new(120.0 + 3.0 * quarter, 1800.0, quarter, 160.0)),
        ("footer", Rect::new(0.0, 2400.0, width, 200.0)),
    ]
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut width = 1280.0;
    let mut live = false;
    for arg in std::env::args().skip(1) {
        if arg == "--live" {
            live = true;
        } else {
            width = arg
                .parse::<f32>()
                .with_context(|| format!("viewport width `{arg}` is not a number"))?;
        }
    }

    let page = PageConfig::from_json(PAGE).context("loading page table")?;

    let sim = Rc::new(TestClock::new());
    let clock: Rc<dyn Clock> = if live {
        Rc::new(SystemClock)
    } else {
        sim.clone()
    };
    let stage = Stage::new(clock, Rect::new(0.0, 0.0, width, 800.0));

    let elements: Vec<Rc<Element>> = layout(width)
        .into_iter()
        .map(|(name, bounds)| Element::new(name, bounds))
        .collect();
    let mut registry = TargetRegistry::new();
    for el in &elements {
        registry.slot(el.name()).attach(el);
    }
    for name in page.target_names() {
        if registry.get(name).is_none_or(|r| !r.is_attached()) {
            log::warn!("page table names '{name}' but nothing is laid out for it");
        }
    }

    let groups = page.build(&registry, width)?;
    let sequencer = RevealSequencer::new(stage.clone());
    let home = Scope::named("home");
    let handles: Vec<_> = groups
        .into_iter()
        .map(|group| sequencer.mount_in(&home, group))
        .collect();

    let run_for = |label: &str, span: Duration| {
        let frames = span.as_millis() / FRAME.as_millis();
        for _ in 0..frames {
            if live {
                std::thread::sleep(FRAME);
            } else {
                sim.advance(FRAME);
            }
            stage.tick();
        }
        log::info!(
            "{label}: t={:?}, {} tweens running, {} timers pending, {} watches armed",
            stage.elapsed(),
            stage.active_tweens(),
            stage.pending_timers(),
            stage.active_watches()
        );
    };

    run_for("hero", Duration::from_millis(3000));
    while stage.viewport().y < 2000.0 {
        stage.scroll_by(400.0);
        run_for(
            &format!("scrolled to {}", stage.viewport().y),
            Duration::from_millis(600),
        );
    }
    run_for("settle", Duration::from_millis(2000));
    if !stage.is_idle() {
        log::warn!("stage still busy after settling");
    }

    for handle in &handles {
        let state = if handle.is_finished() { "done" } else { "waiting" };
        log::info!("{} ({state}): {:?}", handle.name(), handle.phases());
        for fault in handle.faults() {
            log::warn!("{}: {fault}", handle.name());
        }
    }
    let still_hidden: Vec<_> = elements
        .iter()
        .filter(|el| !el.visual().is_resting())
        .map(|el| el.name())
        .collect();
    if !still_hidden.is_empty() {
        log::info!("not revealed yet: {still_hidden:?}");
    }

    home.dispose();
    let stats = stage.stats();
    log::info!("{stats:?}");
    anyhow::ensure!(
        stats.watches_registered == stats.watches_released,
        "{} viewport watches leaked",
        stats.watches_registered - stats.watches_released
    );
    Ok(())
}
