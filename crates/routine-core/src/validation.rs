//! Validation for device configuration.

use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for DeviceConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.trigger.window_low_secs > self.trigger.window_high_secs {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "trigger.window.inverted",
                message: format!(
                    "firing window is empty: low {}s is above high {}s",
                    self.trigger.window_low_secs, self.trigger.window_high_secs
                ),
            });
        }

        if self.trigger.tick_interval_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "trigger.tick_interval.zero",
                message: "tick interval cannot be 0".to_string(),
            });
        }

        if self.execution.poll_interval_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "execution.poll_interval.zero",
                message: "button poll interval cannot be 0".to_string(),
            });
        } else if self.execution.poll_interval_ms >= self.trigger.tick_interval_ms {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "execution.poll_interval.slow",
                message: format!(
                    "button poll interval {}ms is not shorter than the tick interval {}ms",
                    self.execution.poll_interval_ms, self.trigger.tick_interval_ms
                ),
            });
        }

        if self.display.backlight_percent > 100 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "display.backlight.range",
                message: format!(
                    "backlight must be within 0..=100, got {}",
                    self.display.backlight_percent
                ),
            });
        }

        if self.icons.dir.as_os_str().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "icons.dir.empty",
                message: "icon directory must be set".to_string(),
            });
        }

        if let Some(endpoint) = &self.notify.endpoint {
            if endpoint.trim().is_empty() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Warning,
                    code: "notify.endpoint.blank",
                    message: "notify endpoint is blank; reports will go to stdout".to_string(),
                });
            }
        }

        issues
    }
}
