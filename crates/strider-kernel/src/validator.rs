//! [`IntentValidator`] – range checks applied before an intent may be queued.
//!
//! Every registered [`Rule`] is evaluated in insertion order; the first
//! violation returns [`StriderError::InvalidIntentKind`] and the intent never
//! reaches the arbiter.
//!
//! Built-in rules:
//! - [`MoveRangeRule`] – joystick components in `[-1, 1]`, intensity in
//!   `[0, 1]`, all values finite (any finite angle is accepted and later
//!   normalised by the resolver).
//! - [`HeadRangeRule`] – head joystick components in `[-100, 100]`.

use strider_types::{Intent, IntentPayload, MovePayload, StriderError};

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single admissibility check on an [`Intent`].
pub trait Rule: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Return `Ok(())` when the intent is admissible.
    fn check(&self, intent: &Intent) -> Result<(), StriderError>;
}

// ────────────────────────────────────────────────────────────────────────────
// IntentValidator
// ────────────────────────────────────────────────────────────────────────────

/// Ordered collection of [`Rule`]s.
///
/// # Example
///
/// ```
/// use strider_kernel::validator::IntentValidator;
/// use strider_types::{Intent, IntentPayload, MovePayload};
///
/// let validator = IntentValidator::with_default_rules();
///
/// let ok = Intent::manual(IntentPayload::Move(MovePayload::Vector { x: 0.2, y: 0.9 }));
/// assert!(validator.validate(&ok).is_ok());
///
/// let bad = Intent::manual(IntentPayload::Move(MovePayload::Vector { x: 3.0, y: 0.0 }));
/// assert!(validator.validate(&bad).is_err());
/// ```
#[derive(Default)]
pub struct IntentValidator {
    rules: Vec<Box<dyn Rule>>,
}

impl IntentValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator pre-loaded with [`MoveRangeRule`] and [`HeadRangeRule`].
    pub fn with_default_rules() -> Self {
        let mut v = Self::new();
        v.add_rule(Box::new(MoveRangeRule));
        v.add_rule(Box::new(HeadRangeRule { limit: 100.0 }));
        v
    }

    /// Register a new [`Rule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn validate(&self, intent: &Intent) -> Result<(), StriderError> {
        for rule in &self.rules {
            if let Err(err) = rule.check(intent) {
                tracing::debug!(rule = rule.name(), %err, "intent rejected");
                return Err(err);
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

fn invalid(details: String) -> StriderError {
    StriderError::InvalidIntentKind(details)
}

/// Range and finiteness checks for locomotion payloads.
pub struct MoveRangeRule;

impl Rule for MoveRangeRule {
    fn name(&self) -> &str {
        "move_range"
    }

    fn check(&self, intent: &Intent) -> Result<(), StriderError> {
        let IntentPayload::Move(payload) = intent.payload else {
            return Ok(());
        };
        match payload {
            MovePayload::Vector { x, y } => {
                for (axis, value) in [("kx", x), ("ky", y)] {
                    if !(-1.0..=1.0).contains(&value) {
                        return Err(invalid(format!("{axis} {value} out of [-1, 1]")));
                    }
                }
            }
            MovePayload::Polar {
                angle_deg,
                intensity,
            } => {
                if !angle_deg.is_finite() {
                    return Err(invalid(format!("angle {angle_deg} is not finite")));
                }
                if !(0.0..=1.0).contains(&intensity) {
                    return Err(invalid(format!("intensity {intensity} out of [0, 1]")));
                }
            }
        }
        Ok(())
    }
}

/// Rejects head vectors whose components fall outside `[-limit, limit]`.
pub struct HeadRangeRule {
    pub limit: f32,
}

impl Rule for HeadRangeRule {
    fn name(&self) -> &str {
        "head_range"
    }

    fn check(&self, intent: &Intent) -> Result<(), StriderError> {
        if let IntentPayload::Head(head) = intent.payload {
            for (axis, value) in [("qx", head.qx), ("qy", head.qy)] {
                // `contains` is false for NaN.
                if !(-self.limit..=self.limit).contains(&value) {
                    return Err(invalid(format!(
                        "{axis} {value} out of [-{0}, {0}]",
                        self.limit
                    )));
                }
            }
        }
        Ok(())
    }
}
