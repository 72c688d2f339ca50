// Drivetrain trim (curvature correction)
//
// A single signed value compensates for one side of the drivetrain being
// stronger than the other. Positive trim attenuates the right side, negative
// trim the left. Updates outside (-max, max) are rejected whole rather than
// clamped, and every accepted update is written through to the store.

use tracing::{debug, info, warn};

use super::SharedController;
use crate::params::ParamStore;

/// Parameter store key for the trim value
pub const TRIM_KEY: &str = "trim";

/// Per-side scale factors for a trim value: (left, right)
pub fn scales_for(trimvalue: f32) -> (f32, f32) {
    if trimvalue >= 0.0 {
        (1.0, 1.0 - trimvalue)
    } else {
        (1.0 + trimvalue, 1.0)
    }
}

pub struct TrimManager {
    trimvalue: f32,
    left_scale: f32,
    right_scale: f32,
    max_correction: f32,
    store: Box<dyn ParamStore>,
    controller: SharedController,
}

impl TrimManager {
    pub fn new(max_correction: f32, store: Box<dyn ParamStore>, controller: SharedController) -> Self {
        Self {
            trimvalue: 0.0,
            left_scale: 1.0,
            right_scale: 1.0,
            max_correction,
            store,
            controller,
        }
    }

    /// Apply the stored trim, if any, through the same bounded update path
    pub fn load_persistent_params(&mut self) {
        let Some(stored) = self.store.read_param(TRIM_KEY) else {
            debug!("No stored trim, using defaults");
            return;
        };
        if self.adjust_trim(stored as f32) {
            info!("Loaded trim {} from persistent params", self.trimvalue);
        } else {
            warn!("Discarding out-of-range stored trim {}", stored);
        }
    }

    /// Add `delta` to the trim if the result stays strictly inside the bound
    ///
    /// Returns whether the update was applied.
    pub fn adjust_trim(&mut self, delta: f32) -> bool {
        let candidate = self.trimvalue + delta;
        // NaN fails both comparisons and is rejected too
        if !(-self.max_correction < candidate && candidate < self.max_correction) {
            debug!(
                "Rejecting trim delta {} (would give {}, limit {})",
                delta, candidate, self.max_correction
            );
            return false;
        }

        self.trimvalue = candidate;
        (self.left_scale, self.right_scale) = scales_for(candidate);
        self.controller
            .lock()
            .set_trim(self.left_scale, self.right_scale);

        info!("Writing trim {} to persistent params", self.trimvalue);
        if let Err(e) = self.store.write_param(TRIM_KEY, self.trimvalue as f64) {
            warn!("Failed to persist trim {}: {}", self.trimvalue, e);
        }
        true
    }

    pub fn trimvalue(&self) -> f32 {
        self.trimvalue
    }

    /// (left, right)
    pub fn scales(&self) -> (f32, f32) {
        (self.left_scale, self.right_scale)
    }
}
