//! Model record types
//!
//! The structured record the external SBML reader produces, consumed
//! read-only by the compilation pipeline. Field names follow the reader's
//! wire format so a dumped model document loads directly. Nothing in the
//! pipeline mutates these records; derived structures (species index,
//! merged parameter namespace) are built alongside them.

mod ordered;
pub mod validation;

pub use ordered::OrderedMap;
pub use validation::{ValidatedModel, Validator};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SbmlSolError;

/// Complete model record with one collection per component type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelData {
    #[serde(default)]
    pub parameters: OrderedMap<ParameterData>,
    #[serde(default)]
    pub compartments: OrderedMap<CompartmentData>,
    #[serde(default)]
    pub species: OrderedMap<SpeciesData>,
    #[serde(default)]
    pub reactions: OrderedMap<ReactionData>,
    #[serde(default)]
    pub functions: OrderedMap<FunctionData>,
    #[serde(default, rename = "assignmentRules")]
    pub assignment_rules: OrderedMap<RuleData>,
    #[serde(default, rename = "rateRules")]
    pub rate_rules: OrderedMap<RuleData>,
    #[serde(default, rename = "initialAssignments")]
    pub initial_assignments: OrderedMap<RuleData>,
    #[serde(default)]
    pub events: OrderedMap<EventData>,
}

/// How a species records its initial value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValueType {
    #[default]
    Amount,
    Concentration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, rename = "valueType")]
    pub value_type: ValueType,
    #[serde(default)]
    pub compartment: String,
    #[serde(default, rename = "isConstant")]
    pub is_constant: bool,
    #[serde(default, rename = "isBoundarySpecies")]
    pub is_boundary_species: bool,
    #[serde(default, rename = "hasOnlySubstanceUnits")]
    pub has_only_substance_units: bool,
}

impl SpeciesData {
    /// Initial state-vector value; unset initial amounts start at zero
    pub fn initial_value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, rename = "isConstant")]
    pub is_constant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompartmentData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub dimensionality: Option<u32>,
    #[serde(default, rename = "isConstant")]
    pub is_constant: bool,
}

impl CompartmentData {
    /// Compartment size; unset sizes default to unit volume
    pub fn size_or_default(&self) -> f64 {
        self.size.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `(stoichiometry, species id)` pairs
    #[serde(default)]
    pub reactants: Vec<(f64, String)>,
    #[serde(default)]
    pub products: Vec<(f64, String)>,
    #[serde(default, rename = "rateLaw")]
    pub rate_law: String,
    /// Reaction-local `(id, value)` parameters, merged into the global
    /// namespace before parsing
    #[serde(default, rename = "rxnParameters")]
    pub rxn_parameters: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default, rename = "mathString")]
    pub math_string: String,
}

/// Assignment rule or initial assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub variable: String,
    #[serde(default)]
    pub math: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAssignmentData {
    pub variable: String,
    #[serde(default)]
    pub math: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    /// Event delays are outside the supported subset; a set delay is
    /// surfaced as a warning, never silently dropped
    #[serde(default)]
    pub delay: Option<String>,
    #[serde(default = "default_true", rename = "useValuesFromTriggerTime")]
    pub use_values_from_trigger_time: bool,
    #[serde(default, rename = "eventAssignments")]
    pub event_assignments: Vec<EventAssignmentData>,
}

fn default_true() -> bool {
    true
}

/// Global parameter namespace after merging reaction-local parameters
#[derive(Debug, Clone, Default)]
pub struct MergedParameters {
    /// `(name, default value)` in declaration order: globals first, then
    /// reaction-locals per reaction
    pub parameters: Vec<(String, f64)>,
    /// Per-reaction symbol renames for locals that had to be qualified
    pub renames: HashMap<String, HashMap<String, String>>,
}

impl ModelData {
    /// Load a model record from the reader's JSON document
    pub fn from_json_str(json: &str) -> Result<Self, SbmlSolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Dump the record back to JSON
    pub fn to_json_string(&self) -> Result<String, SbmlSolError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Species ids in declaration order (the state-vector layout)
    pub fn species_order(&self) -> Vec<String> {
        self.species.keys().map(str::to_string).collect()
    }

    /// Dense species-id → state-index map; one index per species, no gaps
    pub fn species_index(&self) -> HashMap<String, usize> {
        self.species
            .keys()
            .enumerate()
            .map(|(index, id)| (id.to_string(), index))
            .collect()
    }

    /// Merge reaction-local parameters into the global namespace.
    ///
    /// A local whose id collides with an existing name is qualified as
    /// `reactionId_paramId` and the reaction's rate law is renamed to
    /// match. A collision that survives qualification is an error.
    pub fn merge_parameters(&self) -> Result<MergedParameters, SbmlSolError> {
        let mut merged = MergedParameters::default();
        let mut seen: HashMap<String, ()> = HashMap::new();

        for (id, parameter) in self.parameters.iter() {
            if seen.insert(id.to_string(), ()).is_some() {
                return Err(SbmlSolError::DuplicateParameter(id.to_string()));
            }
            merged
                .parameters
                .push((id.to_string(), parameter.value.unwrap_or(0.0)));
        }

        for (rxn_id, reaction) in self.reactions.iter() {
            for (param_id, value) in &reaction.rxn_parameters {
                let collides = seen.contains_key(param_id)
                    || self.species.contains_key(param_id)
                    || self.compartments.contains_key(param_id);
                let name = if collides {
                    let qualified = format!("{}_{}", rxn_id, param_id);
                    tracing::warn!(
                        reaction = rxn_id,
                        parameter = param_id,
                        qualified = qualified.as_str(),
                        "reaction-local parameter collides with an existing id, qualified"
                    );
                    merged
                        .renames
                        .entry(rxn_id.to_string())
                        .or_default()
                        .insert(param_id.clone(), qualified.clone());
                    qualified
                } else {
                    param_id.clone()
                };
                if seen.insert(name.clone(), ()).is_some() {
                    return Err(SbmlSolError::DuplicateParameter(name));
                }
                merged.parameters.push((name, *value));
            }
        }

        Ok(merged)
    }
}

/// Summary counts for tooling and diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub num_species: usize,
    pub num_parameters: usize,
    pub num_compartments: usize,
    pub num_reactions: usize,
    pub num_functions: usize,
    pub species: Vec<String>,
}

impl ModelInfo {
    pub fn of(model: &ModelData) -> Self {
        Self {
            num_species: model.species.len(),
            num_parameters: model.parameters.len(),
            num_compartments: model.compartments.len(),
            num_reactions: model.reactions.len(),
            num_functions: model.functions.len(),
            species: model.species_order(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_species_model() -> ModelData {
        ModelData::from_json_str(
            r#"{
                "species": {
                    "A": { "Id": "A", "value": 1.0, "compartment": "cell" },
                    "B": { "Id": "B", "value": 0.0, "compartment": "cell" }
                },
                "parameters": {
                    "k1": { "Id": "k1", "value": 0.5, "isConstant": true }
                },
                "compartments": {
                    "cell": { "Id": "cell", "size": 1.0, "isConstant": true }
                },
                "reactions": {
                    "r1": {
                        "Id": "r1",
                        "reactants": [[1.0, "A"]],
                        "products": [[1.0, "B"]],
                        "rateLaw": "k1 * A",
                        "rxnParameters": []
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn species_index_follows_declaration_order() {
        let model = two_species_model();
        let index = model.species_index();
        assert_eq!(index["A"], 0);
        assert_eq!(index["B"], 1);
        assert_eq!(model.species_order(), vec!["A", "B"]);
    }

    #[test]
    fn json_round_trip() {
        let model = two_species_model();
        let dumped = model.to_json_string().unwrap();
        let reloaded = ModelData::from_json_str(&dumped).unwrap();
        assert_eq!(reloaded.species_order(), model.species_order());
        assert_eq!(
            reloaded.reactions.get("r1").unwrap().rate_law,
            "k1 * A"
        );
    }

    #[test]
    fn local_parameter_without_collision_keeps_its_name() {
        let mut model = two_species_model();
        model.reactions.insert(
            "r2",
            ReactionData {
                id: "r2".into(),
                name: None,
                reactants: vec![(1.0, "B".into())],
                products: vec![],
                rate_law: "k2 * B".into(),
                rxn_parameters: vec![("k2".into(), 0.1)],
            },
        );
        let merged = model.merge_parameters().unwrap();
        assert!(merged
            .parameters
            .iter()
            .any(|(name, value)| name == "k2" && *value == 0.1));
        assert!(merged.renames.is_empty());
    }

    #[test]
    fn colliding_local_parameter_is_qualified() {
        let mut model = two_species_model();
        model.reactions.insert(
            "r2",
            ReactionData {
                id: "r2".into(),
                name: None,
                reactants: vec![(1.0, "B".into())],
                products: vec![],
                rate_law: "k1 * B".into(),
                rxn_parameters: vec![("k1".into(), 0.1)],
            },
        );
        let merged = model.merge_parameters().unwrap();
        assert!(merged
            .parameters
            .iter()
            .any(|(name, _)| name == "r2_k1"));
        assert_eq!(merged.renames["r2"]["k1"], "r2_k1");
    }

    #[test]
    fn model_info_counts() {
        let info = ModelInfo::of(&two_species_model());
        assert_eq!(info.num_species, 2);
        assert_eq!(info.num_reactions, 1);
        assert_eq!(info.species, vec!["A", "B"]);
    }
}
