use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Tunables for the unlock rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Minimum quiz score (percent) that counts as a pass.
    pub pass_threshold: u8,
    /// Reject course outlines with duplicate `order` values instead of
    /// resolving ties by input position.
    pub strict_ordering: bool,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            pass_threshold: 70,
            strict_ordering: false,
        }
    }
}

impl GateSettings {
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidPassThreshold` above 100.
    pub fn validate(self) -> Result<Self, SettingsError> {
        if self.pass_threshold > 100 {
            return Err(SettingsError::InvalidPassThreshold(self.pass_threshold));
        }
        Ok(self)
    }

    /// Whole-percent score, rounded half up.
    #[must_use]
    pub fn score(correct: u32, total: u32) -> u8 {
        if total == 0 {
            return 0;
        }
        let correct = u64::from(correct.min(total));
        let total = u64::from(total);
        u8::try_from((correct * 100 + total / 2) / total).unwrap_or(100)
    }

    #[must_use]
    pub fn passes(&self, score: u8) -> bool {
        score >= self.pass_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_seventy_percent() {
        let settings = GateSettings::default();
        assert!(settings.passes(70));
        assert!(!settings.passes(69));
    }

    #[test]
    fn score_rounds_half_up() {
        assert_eq!(GateSettings::score(2, 3), 67);
        assert_eq!(GateSettings::score(1, 8), 13);
        assert_eq!(GateSettings::score(5, 5), 100);
        assert_eq!(GateSettings::score(0, 0), 0);
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let settings = GateSettings {
            pass_threshold: 101,
            ..GateSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidPassThreshold(101))
        );
    }
}
