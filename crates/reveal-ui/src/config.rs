//! # Parameter tables
//!
//! Pages describe their reveals as data instead of hand-writing timelines.
//! A table is JSON:
//!
//! ```json
//! {
//!   "groups": [{
//!     "name": "hero",
//!     "compact_below": "md",
//!     "steps": [
//!       { "target": "heading", "from": { "opacity": 0, "y": 80, "scale": 0.8 },
//!         "from_compact": { "opacity": 0, "y": 50, "scale": 0.9 },
//!         "duration_ms": 2000, "ease": "power3.out", "delay_ms": 300 },
//!       { "target": "subtitle", "from": { "opacity": 0, "y": 40 },
//!         "duration_ms": 1200, "position": "-=1.5" },
//!       { "targets": ["card-1", "card-2", "card-3"], "trigger": "scroll",
//!         "threshold": 0.2, "from": { "opacity": 0, "rotation_y": 45 },
//!         "ease": "back.out(1.7)", "stagger_ms": 150 }
//!     ]
//!   }]
//! }
//! ```
//!
//! Target names resolve through a `TargetRegistry`. Authoring mistakes
//! (unknown names, bad curve or position strings) are errors here; runtime
//! problems (a ref that is not mounted, a zero duration) are left to the
//! sequencer, which degrades instead of failing.

use std::collections::HashMap;

use reveal_core::{Easing, ParseEasingError, VisualPatch};
use serde::Deserialize;
use thiserror::Error;
use web_time::Duration;

use crate::responsive::{Breakpoint, Responsive};
use crate::sequencer::{ParsePositionError, Position, RevealGroup, RevealStep, Trigger};
use crate::target::TargetRef;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid reveal table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("group '{group}' step {step}: {source}")]
    Easing {
        group: String,
        step: usize,
        #[source]
        source: ParseEasingError,
    },

    #[error("group '{group}' step {step}: {source}")]
    Position {
        group: String,
        step: usize,
        #[source]
        source: ParsePositionError,
    },

    #[error("group '{group}' step {step}: no target named '{name}'")]
    UnknownTarget {
        group: String,
        step: usize,
        name: String,
    },

    #[error("group '{group}' step {step}: no target given")]
    NoTarget { group: String, step: usize },
}

/// Name → ref lookup for the elements a page exposes.
#[derive(Clone, Debug, Default)]
pub struct TargetRegistry {
    refs: HashMap<String, TargetRef>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ref for `name`, creating an empty one on first use.
    pub fn slot(&mut self, name: impl Into<String>) -> TargetRef {
        self.refs.entry(name.into()).or_default().clone()
    }

    pub fn insert(&mut self, name: impl Into<String>, target: TargetRef) {
        self.refs.insert(name.into(), target);
    }

    pub fn get(&self, name: &str) -> Option<TargetRef> {
        self.refs.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

fn default_duration_ms() -> f64 {
    1000.0
}

fn default_compact_below() -> Breakpoint {
    Breakpoint::Md
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub from: VisualPatch,
    #[serde(default)]
    pub from_compact: Option<VisualPatch>,
    #[serde(default)]
    pub to: VisualPatch,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: f64,
    #[serde(default)]
    pub ease: Option<String>,
    #[serde(default)]
    pub delay_ms: f64,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub stagger_ms: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default = "default_compact_below")]
    pub compact_below: Breakpoint,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageConfig {
    pub groups: Vec<GroupConfig>,
}

/// Negative or non-finite lengths become zero; the sequencer reports those.
fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_micros((ms * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

impl GroupConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the group for a viewport `viewport_width` pixels wide.
    pub fn build(
        &self,
        registry: &TargetRegistry,
        viewport_width: f32,
    ) -> Result<RevealGroup, ConfigError> {
        let mut group = RevealGroup::new(&self.name);

        for (index, cfg) in self.steps.iter().enumerate() {
            let lookup = |name: &String| {
                registry
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownTarget {
                        group: self.name.clone(),
                        step: index,
                        name: name.clone(),
                    })
            };
            let targets = cfg
                .target
                .iter()
                .chain(cfg.targets.iter())
                .map(lookup)
                .collect::<Result<Vec<_>, _>>()?;
            if targets.is_empty() {
                return Err(ConfigError::NoTarget {
                    group: self.name.clone(),
                    step: index,
                });
            }

            let easing = match &cfg.ease {
                Some(name) => name.parse::<Easing>().map_err(|source| ConfigError::Easing {
                    group: self.name.clone(),
                    step: index,
                    source,
                })?,
                None => Easing::default(),
            };
            let position = match &cfg.position {
                Some(p) => p.parse::<Position>().map_err(|source| ConfigError::Position {
                    group: self.name.clone(),
                    step: index,
                    source,
                })?,
                None => Position::AfterPreviousStart(millis(cfg.delay_ms)),
            };

            let from = match cfg.from_compact {
                Some(compact) => {
                    Responsive::new(compact, cfg.from).pick(viewport_width, self.compact_below)
                }
                None => cfg.from,
            };

            let mut template = RevealStep::new(TargetRef::new())
                .from(from)
                .to(cfg.to)
                .duration(millis(cfg.duration_ms))
                .easing(easing);
            template.trigger = cfg.trigger;
            if let Some(t) = cfg.threshold {
                template.viewport_threshold = t;
            }

            let stagger = millis(cfg.stagger_ms);
            let mut targets = targets.into_iter();
            if let Some(first) = targets.next() {
                group.push_at(template.retarget(first), position);
            }
            // The first step's resolved delay anchors the rest of the stagger.
            let anchor = group.steps().last().map(|s| s.group_delay).unwrap_or_default();
            for (i, target) in targets.enumerate() {
                let delay = match cfg.trigger {
                    Trigger::OnMount => stagger,
                    Trigger::OnScrollIntoView => anchor + stagger * (i as u32 + 1),
                };
                group.push_at(template.retarget(target), Position::AfterPreviousStart(delay));
            }
        }

        Ok(group)
    }
}

impl PageConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn build(
        &self,
        registry: &TargetRegistry,
        viewport_width: f32,
    ) -> Result<Vec<RevealGroup>, ConfigError> {
        self.groups
            .iter()
            .map(|g| g.build(registry, viewport_width))
            .collect()
    }

    /// Every target name the table refers to, in order of first use.
    pub fn target_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for step in self.groups.iter().flat_map(|g| &g.steps) {
            for name in step.target.iter().chain(step.targets.iter()) {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }
}
