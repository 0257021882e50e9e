use std::cell::Cell;
use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use web_time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EaseMode {
    In,
    Out,
    InOut,
}

/// Easing curves. Named the way page authors write them: `"power3.out"`,
/// `"back.out(1.7)"`, `"elastic.out(1, 0.4)"`, `"none"`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    /// `power1` is quadratic, `power4` quintic.
    Power { power: u8, mode: EaseMode },
    Back { overshoot: f32, mode: EaseMode },
    Elastic { amplitude: f32, period: f32, mode: EaseMode },
}

impl Default for Easing {
    fn default() -> Self {
        Easing::Power {
            power: 2,
            mode: EaseMode::Out,
        }
    }
}

impl Easing {
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => t * (2.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::Power { power, mode } => {
                let exp = i32::from(power.clamp(1, 4)) + 1;
                with_mode(mode, t, |p| 1.0 - (1.0 - p).powi(exp))
            }
            Easing::Back { overshoot, mode } => with_mode(mode, t, |p| {
                let overshoot = if overshoot.is_finite() {
                    overshoot
                } else {
                    DEFAULT_OVERSHOOT
                };
                let p = p - 1.0;
                p * p * ((overshoot + 1.0) * p + overshoot) + 1.0
            }),
            Easing::Elastic {
                amplitude,
                period,
                mode,
            } => {
                let amplitude = positive_or(amplitude, 1.0);
                let period = positive_or(period, default_period(mode));
                let p1 = amplitude.max(1.0);
                let p2 = period / amplitude.min(1.0);
                let p3 = p2 / TAU * (1.0 / p1).asin();
                let freq = TAU / p2;
                with_mode(mode, t, |p| {
                    if p >= 1.0 {
                        1.0
                    } else {
                        p1 * 2f32.powf(-10.0 * p) * ((p - p3) * freq).sin() + 1.0
                    }
                })
            }
        }
    }
}

const DEFAULT_OVERSHOOT: f32 = 1.70158;

fn default_period(mode: EaseMode) -> f32 {
    match mode {
        EaseMode::InOut => 0.45,
        _ => 0.3,
    }
}

fn positive_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() && v > 0.0 { v } else { fallback }
}

/// Derives the in / in-out variants from an ease-out curve.
fn with_mode(mode: EaseMode, t: f32, ease_out: impl Fn(f32) -> f32) -> f32 {
    match mode {
        EaseMode::Out => ease_out(t),
        EaseMode::In => 1.0 - ease_out(1.0 - t),
        EaseMode::InOut => {
            if t < 0.5 {
                (1.0 - ease_out(1.0 - t * 2.0)) / 2.0
            } else {
                0.5 + ease_out((t - 0.5) * 2.0) / 2.0
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseEasingError {
    #[error("unknown easing curve `{0}`")]
    UnknownCurve(String),
    #[error("unknown easing mode `{0}` (expected in, out or inOut)")]
    UnknownMode(String),
    #[error("bad easing parameter `{0}`")]
    BadParameter(String),
}

impl FromStr for Easing {
    type Err = ParseEasingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, params) = match s.split_once('(') {
            Some((head, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| ParseEasingError::BadParameter(s.to_string()))?;
                let params = inner
                    .split(',')
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .map(|p| {
                        p.parse::<f32>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| ParseEasingError::BadParameter(p.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                (head, params)
            }
            None => (s, Vec::new()),
        };

        match head {
            "none" | "linear" => return Ok(Easing::Linear),
            "ease-in" => return Ok(Easing::EaseIn),
            "ease-out" => return Ok(Easing::EaseOut),
            "ease-in-out" => return Ok(Easing::EaseInOut),
            _ => {}
        }

        let (family, mode) = head.split_once('.').unwrap_or((head, "out"));
        let mode = match mode {
            "in" => EaseMode::In,
            "out" => EaseMode::Out,
            "inOut" => EaseMode::InOut,
            other => return Err(ParseEasingError::UnknownMode(other.to_string())),
        };

        match family {
            "power1" | "quad" => Ok(Easing::Power { power: 1, mode }),
            "power2" | "cubic" => Ok(Easing::Power { power: 2, mode }),
            "power3" | "quart" => Ok(Easing::Power { power: 3, mode }),
            "power4" | "quint" => Ok(Easing::Power { power: 4, mode }),
            "back" => Ok(Easing::Back {
                overshoot: params.first().copied().unwrap_or(DEFAULT_OVERSHOOT),
                mode,
            }),
            "elastic" => {
                let amplitude = params.first().copied().unwrap_or(1.0);
                if amplitude <= 0.0 {
                    return Err(ParseEasingError::BadParameter(amplitude.to_string()));
                }
                // Zero or missing period: the mode's default.
                let period = params.get(1).copied().unwrap_or(0.0);
                let period = positive_or(period, default_period(mode));
                Ok(Easing::Elastic {
                    amplitude,
                    period,
                    mode,
                })
            }
            other => Err(ParseEasingError::UnknownCurve(other.to_string())),
        }
    }
}

impl TryFrom<String> for Easing {
    type Error = ParseEasingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Easing> for String {
    fn from(value: Easing) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = |m: EaseMode| match m {
            EaseMode::In => "in",
            EaseMode::Out => "out",
            EaseMode::InOut => "inOut",
        };
        match *self {
            Easing::Linear => f.write_str("none"),
            Easing::EaseIn => f.write_str("ease-in"),
            Easing::EaseOut => f.write_str("ease-out"),
            Easing::EaseInOut => f.write_str("ease-in-out"),
            Easing::Power { power, mode: m } => write!(f, "power{}.{}", power, mode(m)),
            Easing::Back { overshoot, mode: m } => write!(f, "back.{}({})", mode(m), overshoot),
            Easing::Elastic {
                amplitude,
                period,
                mode: m,
            } => write!(f, "elastic.{}({}, {})", mode(m), amplitude, period),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationSpec {
    pub duration: Duration,
    pub easing: Easing,
}

impl Default for AnimationSpec {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(1000),
            easing: Easing::default(),
        }
    }
}

impl AnimationSpec {
    pub fn tween(duration: Duration, easing: Easing) -> Self {
        Self { duration, easing }
    }
}

pub trait Interpolate {
    fn interpolate(&self, other: &Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

// Animation clock. Injected into hosts; there is no process-wide clock.
pub trait Clock: 'static {
    fn now(&self) -> Instant;
}

pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A test clock you can drive deterministically.
pub struct TestClock {
    origin: Instant,
    t: Cell<Instant>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            t: Cell::new(origin),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.t.set(self.t.get() + by);
    }

    /// Moves the clock to `at` past its origin. Never moves backwards.
    pub fn set_elapsed(&self, at: Duration) {
        let target = self.origin + at;
        if target > self.t.get() {
            self.t.set(target);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.t.get() - self.origin
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.t.get()
    }
}

/// A value travelling from `start` to `target` over `spec`, sampled against
/// whatever clock the caller owns.
pub struct AnimatedValue<T: Interpolate + Clone> {
    current: T,
    target: T,
    start: T,
    spec: AnimationSpec,
    start_time: Option<Instant>,
}

impl<T: Interpolate + Clone> AnimatedValue<T> {
    pub fn new(initial: T, spec: AnimationSpec) -> Self {
        Self {
            current: initial.clone(),
            target: initial.clone(),
            start: initial,
            spec,
            start_time: None,
        }
    }

    pub fn set_target(&mut self, target: T, now: Instant) {
        self.start = self.current.clone();
        self.target = target;
        self.start_time = Some(now);
    }

    /// Returns `true` while the animation is still running.
    pub fn update(&mut self, now: Instant) -> bool {
        let Some(start) = self.start_time else {
            return false;
        };
        let animation_time = now.saturating_duration_since(start);

        if animation_time >= self.spec.duration {
            self.current = self.target.clone();
            self.start_time = None;
            return false;
        }

        let t = animation_time.as_secs_f32() / self.spec.duration.as_secs_f32();
        let eased_t = self.spec.easing.apply(t);
        self.current = self.start.interpolate(&self.target, eased_t);

        true
    }

    pub fn get(&self) -> &T {
        &self.current
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn is_animating(&self) -> bool {
        self.start_time.is_some()
    }
}
