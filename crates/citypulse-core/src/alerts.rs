//! One-shot threshold alerts raised while the optimization protocol runs.

use std::borrow::Cow;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::Metrics;

/// Key of the alert raised when the protocol is activated.
pub const OPTIMIZE_ALERT_KEY: &str = "optimize";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Alert message as delivered across the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alert {
    /// Wall-clock time in epoch milliseconds.
    pub ts: u64,
    pub severity: Severity,
    pub message: Cow<'static, str>,
    pub key: Cow<'static, str>,
}

/// Threshold predicate keyed by a unique string.
#[derive(Debug, Clone, Copy)]
pub struct AlertRule {
    pub key: &'static str,
    pub severity: Severity,
    pub message: &'static str,
    condition: fn(&Metrics, bool) -> bool,
}

impl AlertRule {
    /// Whether the rule's condition holds for these inputs.
    #[must_use]
    pub fn matches(&self, metrics: &Metrics, in_collapse: bool) -> bool {
        (self.condition)(metrics, in_collapse)
    }

    fn raise(&self, ts: u64) -> Alert {
        Alert {
            ts,
            severity: self.severity,
            message: Cow::Borrowed(self.message),
            key: Cow::Borrowed(self.key),
        }
    }
}

fn productivity_high(m: &Metrics, _: bool) -> bool {
    m.productivity > 90.0
}

fn collapse_reached(_: &Metrics, in_collapse: bool) -> bool {
    in_collapse
}

fn burnout_over_30(m: &Metrics, _: bool) -> bool {
    m.burnout > 30.0
}

fn burnout_over_50(m: &Metrics, _: bool) -> bool {
    m.burnout > 50.0
}

fn unemployment_over_15(m: &Metrics, _: bool) -> bool {
    m.unemployment > 15.0
}

fn unemployment_over_25(m: &Metrics, _: bool) -> bool {
    m.unemployment > 25.0
}

fn happiness_under_20(m: &Metrics, _: bool) -> bool {
    m.happiness < 20.0
}

fn productivity_low(m: &Metrics, _: bool) -> bool {
    m.productivity < 50.0
}

/// Evaluation order matters: alerts raised in one pass keep this order.
pub const ALERT_RULES: [AlertRule; 8] = [
    AlertRule {
        key: "prod90",
        severity: Severity::Info,
        message: "Productivity above 90%. Leadership is pleased.",
        condition: productivity_high,
    },
    AlertRule {
        key: "phase2",
        severity: Severity::Warning,
        message: "Efficiency gains plateaued. Escalating output targets.",
        condition: collapse_reached,
    },
    AlertRule {
        key: "burnout30",
        severity: Severity::Warning,
        message: "Burnout exceeds 30% of the workforce.",
        condition: burnout_over_30,
    },
    AlertRule {
        key: "burnout50",
        severity: Severity::Critical,
        message: "Burnout cluster detected citywide. Half the workforce depleted.",
        condition: burnout_over_50,
    },
    AlertRule {
        key: "unemp15",
        severity: Severity::Warning,
        message: "Quiet quitting wave detected. Unemployment above 15%.",
        condition: unemployment_over_15,
    },
    AlertRule {
        key: "unemp25",
        severity: Severity::Critical,
        message: "Unemployment above 25%. Layoffs reclassified as optimization.",
        condition: unemployment_over_25,
    },
    AlertRule {
        key: "happy20",
        severity: Severity::Critical,
        message: "Happiness quota not met. Investigating.",
        condition: happiness_under_20,
    },
    AlertRule {
        key: "prod50",
        severity: Severity::Critical,
        message: "Productivity below 50%. Optimization complete.",
        condition: productivity_low,
    },
];

/// Tracks which alert keys have fired since the last activation.
#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    fired: HashSet<&'static str>,
}

impl AlertEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every fired key. Called only when the protocol activates.
    pub fn reset(&mut self) {
        self.fired.clear();
    }

    #[must_use]
    pub fn has_fired(&self, key: &str) -> bool {
        self.fired.contains(key)
    }

    #[must_use]
    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    /// Evaluate every rule in table order, returning alerts not raised before.
    pub fn check(&mut self, metrics: &Metrics, in_collapse: bool, ts: u64) -> Vec<Alert> {
        let mut raised = Vec::new();
        for rule in &ALERT_RULES {
            if self.fired.contains(rule.key) || !rule.matches(metrics, in_collapse) {
                continue;
            }
            self.fired.insert(rule.key);
            raised.push(rule.raise(ts));
        }
        raised
    }
}

/// The activation alert; it is not part of the threshold table and is not deduplicated.
#[must_use]
pub fn optimize_alert(ts: u64) -> Alert {
    Alert {
        ts,
        severity: Severity::Warning,
        message: Cow::Borrowed("Optimization protocol engaged. Morale is now optional."),
        key: Cow::Borrowed(OPTIMIZE_ALERT_KEY),
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
