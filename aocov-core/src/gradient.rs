//! Coverage color gradient.
//!
//! Coverage maps onto a green band between `stage2` and `stage1` and a red
//! band below `stage2`. Tokens are three hex digits, usable as `#rgb`.

use serde::{Deserialize, Serialize};

/// Token for coverage at or above `stage1`.
pub const FULL_GREEN: &str = "4c1";

const GREEN_BASE: u32 = 0x4c;
const GREEN_STEP: u32 = 0x10;
const RED_BASE: u32 = 0xe1;
const GREEN_STEPS: f64 = 10.0;
const RED_STEPS: f64 = 11.0;
const MAX_STEP: f64 = 10.0;

/// Two-stage threshold configuration for badge colors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStyle {
    /// Coverage at or above this value is fully green.
    pub stage1: f64,
    /// Coverage below this value moves towards fully red.
    pub stage2: f64,
}

impl GradientStyle {
    /// Build a gradient style from its two thresholds.
    pub fn new(stage1: f64, stage2: f64) -> Self {
        Self { stage1, stage2 }
    }
}

impl Default for GradientStyle {
    fn default() -> Self {
        Self::new(95.0, 80.0)
    }
}

/// Map a coverage percentage to its badge color token.
pub fn match_color(coverage: f64, style: &GradientStyle) -> String {
    let band = if coverage >= style.stage1 {
        GREEN_BASE
    } else if coverage >= style.stage2 {
        let distance = (style.stage1 - coverage) / (style.stage1 - style.stage2);
        let step = step_index(distance * GREEN_STEPS);
        GREEN_BASE + GREEN_STEP * step
    } else {
        let step = step_index(coverage / (style.stage2 / RED_STEPS));
        RED_BASE + step
    };
    format!("{band:02x}1")
}

// Clamped so a zero or negative stage2 never yields an out-of-band token.
fn step_index(raw: f64) -> u32 {
    if raw.is_nan() {
        return 0;
    }
    raw.floor().clamp(0.0, MAX_STEP) as u32
}
