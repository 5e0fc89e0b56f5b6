//! Parameter catalog: the set of labelled model parameters with bounds.
//!
//! The catalog is built once from the model and then only ever replaced
//! wholesale by the worker when a batch of updates is committed. Handlers
//! read a shared snapshot to validate submissions before they are queued.

use std::collections::BTreeMap;

use catalyst_types::{ParameterSpec, ParameterUpdate};

use crate::model::ModelDefinition;

/// Why a parameter update was rejected.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    /// No parameter with this label exists.
    #[error("unknown parameter '{0}'")]
    UnknownLabel(String),

    /// The parameter exists but is fixed.
    #[error("parameter '{0}' is not adjustable")]
    NotAdjustable(String),

    /// The value is NaN or infinite.
    #[error("value for '{label}' is not a finite number")]
    NotFinite {
        /// Parameter label.
        label: String,
    },

    /// The value lies outside the inclusive bounds.
    #[error("value {value} for '{label}' is outside [{min}, {max}]")]
    OutOfRange {
        /// Parameter label.
        label: String,
        /// Submitted value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

/// Labelled parameters with their bounds and current values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterCatalog {
    entries: BTreeMap<String, ParameterSpec>,
}

impl ParameterCatalog {
    /// Build the catalog from the model's parameter definitions.
    pub fn from_model(model: &ModelDefinition) -> Self {
        let entries = model
            .parameters
            .iter()
            .map(|p| {
                (
                    p.label.clone(),
                    ParameterSpec {
                        min: p.lower(),
                        max: p.upper(),
                        value: p.value,
                        adjustable: p.adjustable,
                        scale: p.scale,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Look up one parameter.
    pub fn get(&self, label: &str) -> Option<&ParameterSpec> {
        self.entries.get(label)
    }

    /// All parameters keyed by label.
    pub const fn specs(&self) -> &BTreeMap<String, ParameterSpec> {
        &self.entries
    }

    /// Current value of every parameter.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|(label, spec)| (label.clone(), spec.value))
            .collect()
    }

    /// Check one update against this catalog without applying it.
    pub fn validate(&self, update: &ParameterUpdate) -> Result<(), ValidationError> {
        let spec = self
            .entries
            .get(&update.label)
            .ok_or_else(|| ValidationError::UnknownLabel(update.label.clone()))?;

        if !spec.adjustable {
            return Err(ValidationError::NotAdjustable(update.label.clone()));
        }
        if !update.value.is_finite() {
            return Err(ValidationError::NotFinite {
                label: update.label.clone(),
            });
        }
        if update.value < spec.min || update.value > spec.max {
            return Err(ValidationError::OutOfRange {
                label: update.label.clone(),
                value: update.value,
                min: spec.min,
                max: spec.max,
            });
        }
        Ok(())
    }

    /// Produce a new catalog with every valid update applied.
    ///
    /// Invalid updates are left out and returned alongside the new
    /// catalog. `self` is never modified, so a failed engine commit can
    /// simply discard the result.
    pub fn with_updates(
        &self,
        updates: &BTreeMap<String, f64>,
    ) -> (Self, Vec<ValidationError>) {
        let mut next = self.clone();
        let mut rejected = Vec::new();
        for (label, &value) in updates {
            let update = ParameterUpdate::new(label.clone(), value);
            match self.validate(&update) {
                Ok(()) => {
                    if let Some(spec) = next.entries.get_mut(label) {
                        spec.value = value;
                    }
                }
                Err(e) => rejected.push(e),
            }
        }
        (next, rejected)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ParameterCatalog {
        ParameterCatalog::from_model(&ModelDefinition::methanation())
    }

    #[test]
    fn built_from_model() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 9);
        let t = catalog.get("T");
        assert!(t.is_some_and(|spec| spec.adjustable && (spec.value - 523.0).abs() < 1e-9));
        let a = catalog.get("A");
        assert!(a.is_some_and(|spec| !spec.adjustable));
    }

    #[test]
    fn accepts_in_range_and_bounds() {
        let catalog = catalog();
        assert_eq!(catalog.validate(&ParameterUpdate::new("T", 600.0)), Ok(()));
        assert_eq!(catalog.validate(&ParameterUpdate::new("T", 400.0)), Ok(()));
        assert_eq!(catalog.validate(&ParameterUpdate::new("T", 800.0)), Ok(()));
    }

    #[test]
    fn rejects_out_of_range() {
        let err = catalog().validate(&ParameterUpdate::new("T", 900.0));
        assert!(matches!(err, Err(ValidationError::OutOfRange { ref label, .. }) if label == "T"));
    }

    #[test]
    fn rejects_unknown_and_fixed() {
        let catalog = catalog();
        assert_eq!(
            catalog.validate(&ParameterUpdate::new("X", 1.0)),
            Err(ValidationError::UnknownLabel(String::from("X")))
        );
        assert_eq!(
            catalog.validate(&ParameterUpdate::new("alpha", 0.5)),
            Err(ValidationError::NotAdjustable(String::from("alpha")))
        );
    }

    #[test]
    fn rejects_non_finite() {
        assert!(matches!(
            catalog().validate(&ParameterUpdate::new("E_C", f64::NAN)),
            Err(ValidationError::NotFinite { .. })
        ));
    }

    #[test]
    fn with_updates_applies_valid_and_reports_invalid() {
        let original = catalog();
        let mut updates = BTreeMap::new();
        updates.insert(String::from("T"), 700.0);
        updates.insert(String::from("p_COgas"), 1e5);
        let (next, rejected) = original.with_updates(&updates);

        assert_eq!(rejected.len(), 1);
        assert!(next.get("T").is_some_and(|s| (s.value - 700.0).abs() < 1e-9));
        assert!(next.get("p_COgas").is_some_and(|s| (s.value - 0.01).abs() < 1e-12));
        assert!(original.get("T").is_some_and(|s| (s.value - 523.0).abs() < 1e-9));
    }
}
