//! Visual state of a revealable element.
//!
//! `VisualState` is the full transform + opacity snapshot a host applies to an
//! element. `VisualPatch` is the authoring form: every field is optional and
//! falls back to the resting value, so `{ opacity: 0, offset_y: 80 }` means
//! "invisible, 80px low, otherwise at rest".

use serde::{Deserialize, Serialize};

use crate::animation::Interpolate;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisualState {
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale: f32,
    /// Degrees, in-plane.
    pub rotation: f32,
    /// Degrees, tilt around the horizontal axis.
    pub rotation_x: f32,
    /// Degrees, tilt around the vertical axis.
    pub rotation_y: f32,
    pub opacity: f32,
}

impl VisualState {
    pub const RESTING: VisualState = VisualState {
        offset_x: 0.0,
        offset_y: 0.0,
        scale: 1.0,
        rotation: 0.0,
        rotation_x: 0.0,
        rotation_y: 0.0,
        opacity: 1.0,
    };

    pub fn is_resting(&self) -> bool {
        self.approx_eq(&Self::RESTING, 1e-4)
    }

    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        let close = |a: f32, b: f32| (a - b).abs() <= eps;
        close(self.offset_x, other.offset_x)
            && close(self.offset_y, other.offset_y)
            && close(self.scale, other.scale)
            && close(self.rotation, other.rotation)
            && close(self.rotation_x, other.rotation_x)
            && close(self.rotation_y, other.rotation_y)
            && close(self.opacity, other.opacity)
    }
}

impl Default for VisualState {
    fn default() -> Self {
        Self::RESTING
    }
}

impl Interpolate for VisualState {
    fn interpolate(&self, other: &Self, t: f32) -> Self {
        Self {
            offset_x: self.offset_x.interpolate(&other.offset_x, t),
            offset_y: self.offset_y.interpolate(&other.offset_y, t),
            scale: self.scale.interpolate(&other.scale, t),
            rotation: self.rotation.interpolate(&other.rotation, t),
            rotation_x: self.rotation_x.interpolate(&other.rotation_x, t),
            rotation_y: self.rotation_y.interpolate(&other.rotation_y, t),
            opacity: self.opacity.interpolate(&other.opacity, t),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualPatch {
    #[serde(alias = "x")]
    pub offset_x: Option<f32>,
    #[serde(alias = "y")]
    pub offset_y: Option<f32>,
    pub scale: Option<f32>,
    #[serde(alias = "rotation_z")]
    pub rotation: Option<f32>,
    pub rotation_x: Option<f32>,
    pub rotation_y: Option<f32>,
    pub opacity: Option<f32>,
}

impl VisualPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills unset fields with resting values. Opacity is clamped into [0, 1].
    pub fn resolve(&self) -> VisualState {
        let r = VisualState::RESTING;
        let opacity = self.opacity.unwrap_or(r.opacity);
        if !(0.0..=1.0).contains(&opacity) {
            log::debug!("opacity {opacity} outside [0, 1]; clamping");
        }
        VisualState {
            offset_x: self.offset_x.unwrap_or(r.offset_x),
            offset_y: self.offset_y.unwrap_or(r.offset_y),
            scale: self.scale.unwrap_or(r.scale),
            rotation: self.rotation.unwrap_or(r.rotation),
            rotation_x: self.rotation_x.unwrap_or(r.rotation_x),
            rotation_y: self.rotation_y.unwrap_or(r.rotation_y),
            opacity: opacity.clamp(0.0, 1.0),
        }
    }

    pub fn offset(mut self, x: f32, y: f32) -> Self {
        self.offset_x = Some(x);
        self.offset_y = Some(y);
        self
    }
    pub fn offset_x(mut self, x: f32) -> Self {
        self.offset_x = Some(x);
        self
    }
    pub fn offset_y(mut self, y: f32) -> Self {
        self.offset_y = Some(y);
        self
    }
    pub fn scale(mut self, s: f32) -> Self {
        self.scale = Some(s);
        self
    }
    pub fn rotation(mut self, deg: f32) -> Self {
        self.rotation = Some(deg);
        self
    }
    pub fn rotation_x(mut self, deg: f32) -> Self {
        self.rotation_x = Some(deg);
        self
    }
    pub fn rotation_y(mut self, deg: f32) -> Self {
        self.rotation_y = Some(deg);
        self
    }
    pub fn opacity(mut self, a: f32) -> Self {
        self.opacity = Some(a);
        self
    }

    /// Shorthand for the most common entrance: invisible and shifted.
    pub fn fade_from(x: f32, y: f32) -> Self {
        Self::new().opacity(0.0).offset(x, y)
    }
}
