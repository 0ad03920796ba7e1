//! Model validation
//!
//! Checks the reader-produced record against the supported subset before
//! any symbolic work starts. Constructs outside the subset fail here,
//! loudly: a model that silently dropped a rate rule would compile into a
//! simulation that is simply wrong.

use crate::error::SbmlSolError;
use crate::model::ModelData;

/// A model that has passed all validation checks
///
/// The wrapper guarantees the contained record is inside the supported
/// subset and ready for compilation.
#[derive(Debug, Clone)]
pub struct ValidatedModel(ModelData);

impl ValidatedModel {
    /// Get the inner model record
    pub fn inner(&self) -> &ModelData {
        &self.0
    }

    /// Consume the wrapper and return the inner record
    pub fn into_inner(self) -> ModelData {
        self.0
    }
}

/// Validator for model records
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a model record
    pub fn validate(&self, model: &ModelData) -> Result<ValidatedModel, SbmlSolError> {
        self.reject_rate_rules(model)?;
        self.reject_algebraic_rules(model)?;
        self.check_parameter_namespace(model)?;
        self.warn_on_unknown_compartments(model);
        self.warn_on_event_delays(model);
        Ok(ValidatedModel(model.clone()))
    }

    /// Rate rules have ODE semantics of their own and are not supported
    /// as assignment rules
    fn reject_rate_rules(&self, model: &ModelData) -> Result<(), SbmlSolError> {
        if let Some((id, rule)) = model.rate_rules.iter().next() {
            return Err(SbmlSolError::unsupported(
                "rate rule",
                format!("rule '{}' targets '{}'", id, rule.variable),
            ));
        }
        Ok(())
    }

    /// An assignment rule without a target variable is an algebraic rule
    fn reject_algebraic_rules(&self, model: &ModelData) -> Result<(), SbmlSolError> {
        for (id, rule) in model
            .assignment_rules
            .iter()
            .chain(model.initial_assignments.iter())
        {
            if rule.variable.is_empty() {
                return Err(SbmlSolError::unsupported(
                    "algebraic rule",
                    format!("rule '{}' has no target variable", id),
                ));
            }
        }
        Ok(())
    }

    fn check_parameter_namespace(&self, model: &ModelData) -> Result<(), SbmlSolError> {
        model.merge_parameters().map(|_| ())
    }

    fn warn_on_unknown_compartments(&self, model: &ModelData) {
        for (id, species) in model.species.iter() {
            if !species.compartment.is_empty()
                && !model.compartments.contains_key(&species.compartment)
            {
                tracing::warn!(
                    species = id,
                    compartment = species.compartment.as_str(),
                    "species references an undeclared compartment"
                );
            }
        }
    }

    fn warn_on_event_delays(&self, model: &ModelData) {
        for (id, event) in model.events.iter() {
            if event.delay.is_some() {
                tracing::warn!(
                    event = id,
                    "event delay is not supported and will be ignored"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuleData;

    #[test]
    fn rate_rules_are_rejected() {
        let mut model = ModelData::default();
        model.rate_rules.insert(
            "rr1",
            RuleData {
                id: "rr1".into(),
                name: None,
                variable: "X".into(),
                math: "k * X".into(),
            },
        );
        let result = Validator::new().validate(&model);
        assert!(matches!(
            result,
            Err(SbmlSolError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn algebraic_rules_are_rejected() {
        let mut model = ModelData::default();
        model.assignment_rules.insert(
            "ar1",
            RuleData {
                id: "ar1".into(),
                name: None,
                variable: String::new(),
                math: "x + y".into(),
            },
        );
        let result = Validator::new().validate(&model);
        assert!(matches!(
            result,
            Err(SbmlSolError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn empty_model_validates() {
        assert!(Validator::new().validate(&ModelData::default()).is_ok());
    }
}
