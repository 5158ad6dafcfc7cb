//! Six-step form controller
//!
//! Steps advance strictly one at a time. The only branch is at step 4, where
//! choosing the same crop as last season raises a rotation warning that
//! blocks progress until the user either continues anyway or starts over.

use crate::form::FormData;
use tracing::debug;

pub const TOTAL_STEPS: u8 = 6;

/// Step holding the previous-crop selection and the rotation check
pub const ROTATION_STEP: u8 = 4;

pub fn step_title(step: u8) -> &'static str {
    match step {
        1 => "Select the crop to cultivate",
        2 => "Choose farming type",
        3 => "Enter region",
        4 => "Select previous crop",
        5 => "Soil Health Parameters (Optional)",
        6 => "Ask for Predictions & Suggestions",
        _ => "",
    }
}

/// Result of asking the controller to move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextOutcome {
    Advanced(u8),
    /// Required field for the current step is still empty
    Blocked,
    /// Same crop as last season; waiting for continue or restart
    RotationWarning,
    AtEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepState {
    current_step: u8,
    show_warning: bool,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            current_step: 1,
            show_warning: false,
        }
    }
}

impl StepState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_step(&self) -> u8 {
        self.current_step
    }

    pub fn show_warning(&self) -> bool {
        self.show_warning
    }

    pub fn is_last(&self) -> bool {
        self.current_step == TOTAL_STEPS
    }

    /// Fraction of the form completed, for the progress bar
    pub fn progress(&self) -> f64 {
        f64::from(self.current_step) / f64::from(TOTAL_STEPS)
    }

    /// Whether the active step has everything it needs to move on
    pub fn is_step_valid(&self, form: &FormData) -> bool {
        match self.current_step {
            1 => form.crop.is_some(),
            2 => form.farming_type.is_some(),
            3 => !form.state.is_empty() && !form.district.is_empty(),
            4 => form.previous_crop.is_some(),
            5 | 6 => true,
            _ => false,
        }
    }

    pub fn next(&mut self, form: &FormData) -> NextOutcome {
        if !self.is_step_valid(form) {
            return NextOutcome::Blocked;
        }

        if self.current_step == ROTATION_STEP && form.repeats_previous_crop() {
            self.show_warning = true;
            debug!(crop = ?form.crop, "rotation warning raised");
            return NextOutcome::RotationWarning;
        }

        if self.is_last() {
            return NextOutcome::AtEnd;
        }

        self.current_step += 1;
        self.show_warning = false;
        debug!(step = self.current_step, "advanced");
        NextOutcome::Advanced(self.current_step)
    }

    pub fn previous(&mut self) {
        self.current_step = self.current_step.saturating_sub(1).max(1);
        self.show_warning = false;
    }

    /// Override the rotation warning. No-op unless the warning is showing.
    pub fn continue_anyway(&mut self) -> bool {
        if !self.show_warning || self.current_step != ROTATION_STEP {
            return false;
        }
        self.show_warning = false;
        self.current_step = ROTATION_STEP + 1;
        debug!("rotation warning overridden");
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
