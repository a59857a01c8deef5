//! Fade curve implementations for the crossfade transition
//!
//! Audio: the outgoing track ramps down while the incoming track ramps up over
//! the whole fade window. The default is a linear ramp; equal-power is offered
//! as a tunable alternative because a linear cross-ramp can produce a
//! perceived loudness dip at the midpoint.
//!
//! Picture: a dip-to-black. The outgoing picture fades to black over the first
//! half of the window and the incoming picture fades in from black over the
//! second half, so the two streams' imagery is never shown blended.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Audio ramp shape used during a crossfade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// Linear: out(t) = 1 - t, in(t) = t
    #[default]
    Linear,

    /// Equal-Power: out(t) = cos(t × π/2), in(t) = sin(t × π/2)
    /// Maintains constant perceived loudness during the overlap
    EqualPower,
}

/// Audio gain and picture opacity for both engines at one instant of a fade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeLevels {
    /// Gain of the outgoing (Active) engine
    pub outgoing_volume: f32,
    /// Gain of the incoming (Standby) engine
    pub incoming_volume: f32,
    /// Picture opacity of the outgoing engine
    pub outgoing_opacity: f32,
    /// Picture opacity of the incoming engine
    pub incoming_opacity: f32,
}

impl FadeCurve {
    /// Gain of the incoming track at normalized position (0.0-1.0)
    pub fn calculate_fade_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Gain of the outgoing track at normalized position (0.0-1.0)
    pub fn calculate_fade_out(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos().max(0.0),
        }
    }

    /// Complete audio + picture levels at normalized progress (0.0-1.0)
    pub fn levels(&self, progress: f32) -> FadeLevels {
        let t = progress.clamp(0.0, 1.0);
        let (outgoing_opacity, incoming_opacity) = dip_to_black(t);

        FadeLevels {
            outgoing_volume: self.calculate_fade_out(t),
            incoming_volume: self.calculate_fade_in(t),
            outgoing_opacity,
            incoming_opacity,
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::EqualPower => "Equal Power",
        }
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Picture opacities (outgoing, incoming) for a dip-to-black at progress `t`
///
/// At most one of the two values is non-zero at any instant.
pub fn dip_to_black(progress: f32) -> (f32, f32) {
    let t = progress.clamp(0.0, 1.0);
    let outgoing = (1.0 - 2.0 * t).max(0.0);
    let incoming = (2.0 * t - 1.0).max(0.0);
    (outgoing, incoming)
}
