//! Complete-file assembly
//!
//! Takes the rendered statement blocks and fills them into the skeleton of
//! the generated module: result and parameter record types, the
//! `run_simulation` entry point driving a stiff BDF integration with root
//! finding, and the metadata introspection endpoints. The output is a
//! self-contained source file; its own manifest brings `diffsol`, `serde`
//! and `serde_json`.

use crate::codegen::idents::to_identifier;
use crate::codegen::printer::float_literal;

/// Every fragment the file skeleton needs
#[derive(Debug, Clone, Default)]
pub struct FileComponents {
    pub model_name: String,
    pub n_species: usize,
    /// `pub k1: Option<f64>,` lines for parameters and compartments
    pub param_fields: String,
    /// `pub init_a: Option<f64>,` lines for per-species overrides
    pub init_fields: String,
    pub param_extract: String,
    pub init_bindings: String,
    pub static_rules: String,
    pub initial_assignments: String,
    pub species_extract: String,
    pub temp_vars: String,
    pub dynamic_rules: String,
    pub rhs_block: String,
    pub jac_block: String,
    pub initial_state: String,
    pub result_vectors_init: String,
    pub initial_pushes: String,
    pub loop_pushes: String,
    pub map_inserts: String,
    pub root_fn: String,
    pub event_handling: String,
    pub root_registration: String,
    pub default_param_entries: String,
    pub metadata_species: String,
    pub metadata_parameters: String,
}

/// Assembles generated source files from components
#[derive(Debug, Default)]
pub struct TemplateManager;

impl TemplateManager {
    pub fn new() -> Self {
        Self
    }

    /// Field lines for the parameter record: one optional field per
    /// parameter/compartment plus per-species initial-value overrides.
    pub fn struct_fields(
        &self,
        parameters: &[(String, f64)],
        species: &[(String, f64)],
    ) -> (String, String) {
        let param_fields = parameters
            .iter()
            .map(|(name, _)| format!("    pub {}: Option<f64>,", name))
            .collect::<Vec<_>>()
            .join("\n");
        let init_fields = species
            .iter()
            .map(|(id, _)| format!("    pub init_{}: Option<f64>,", to_identifier(id)))
            .collect::<Vec<_>>()
            .join("\n");
        (param_fields, init_fields)
    }

    /// JSON metadata entry lines for the introspection endpoint
    pub fn metadata_entries(
        &self,
        species: &[(String, f64)],
        parameters: &[(String, f64)],
    ) -> (String, String) {
        let species = species
            .iter()
            .map(|(id, value)| {
                format!(
                    "            {{ \"id\": \"{}\", \"initialAmount\": {} }},",
                    id,
                    float_literal(*value),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let parameters = parameters
            .iter()
            .map(|(name, value)| {
                format!(
                    "            {{ \"id\": \"{}\", \"value\": {} }},",
                    name,
                    float_literal(*value),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        (species, parameters)
    }

    /// Assemble the complete source file
    pub fn assemble(&self, c: &FileComponents) -> String {
        format!(
            r#"// Generated simulation code for model: {model_name}
// Derivatives and Jacobian share CSE temporaries.

use diffsol::{{OdeBuilder, OdeSolverMethod, OdeSolverStopReason, Vector}};
use serde::{{Deserialize, Serialize}};
use std::collections::HashMap;

type M = diffsol::NalgebraMat<f64>;
type LS = diffsol::NalgebraLU<f64>;

#[derive(Serialize, Deserialize)]
pub struct SimulationResult {{
    pub species: HashMap<String, Vec<f64>>,
    pub time: Vec<f64>,
}}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SimulationParams {{
{param_fields}
{init_fields}
    pub final_time: Option<f64>,
}}

#[allow(unused_variables)]
pub fn run_simulation(params: &str) -> String {{
    let sim_params: SimulationParams = match serde_json::from_str(params) {{
        Ok(p) => p,
        Err(e) => {{
            eprintln!("error parsing params: {{}}", e);
            return serde_json::to_string(&SimulationResult {{
                species: HashMap::new(),
                time: vec![],
            }})
            .unwrap();
        }}
    }};

{param_extract}
{init_bindings}

    // Static rules (constants only, evaluated once per run)
{static_rules}

    // Initial assignments
{initial_assignments}

{root_fn}
    // RHS closure
    let rhs = |y: &diffsol::NalgebraVec<f64>, _p: &diffsol::NalgebraVec<f64>, t: f64, dy: &mut diffsol::NalgebraVec<f64>| {{
{species_extract}

{dynamic_rules_rhs}
        // Temporary variables (CSE)
{temp_vars}

        // Derivatives
{rhs_block}
    }};

    // Jacobian closure (matrix-vector product)
    let jac = |y: &diffsol::NalgebraVec<f64>, _p: &diffsol::NalgebraVec<f64>, t: f64, v: &diffsol::NalgebraVec<f64>, jv: &mut diffsol::NalgebraVec<f64>| {{
        for i in 0..jv.len() {{
            jv[i] = 0.0;
        }}
{species_extract}

{dynamic_rules_jac}
        // Temporary variables (CSE)
{temp_vars}

        // Jacobian-vector product
{jac_block}
    }};

    let init = |_y0: &diffsol::NalgebraVec<f64>, _t: f64, y: &mut diffsol::NalgebraVec<f64>| {{
{initial_state}
    }};

    let problem = OdeBuilder::<M>::new()
        .rhs_implicit(rhs, jac)
        .init(init, {n_species})
        {root_registration}
        .build()
        .unwrap();

    let mut solver = problem.bdf::<LS>().unwrap();
    let mut time = Vec::new();

{result_vectors_init}

{initial_pushes}
    time.push(0.0);

    let final_time = sim_params.final_time.unwrap_or(24.0);
    solver.set_stop_time(final_time).unwrap();
    loop {{
        match solver.step() {{
            Ok(OdeSolverStopReason::InternalTimestep) => {{
{loop_pushes}
                time.push(solver.state().t);
            }},
{event_handling}
            Ok(OdeSolverStopReason::TstopReached) => break,
            Err(e) => panic!("solver error: {{}}", e),
        }}
    }}

    let mut species_map = HashMap::new();
{map_inserts}

    let result = SimulationResult {{
        time,
        species: species_map,
    }};

    serde_json::to_string(&result).unwrap()
}}

pub fn get_default_parameters() -> String {{
    let mut map: HashMap<String, f64> = HashMap::new();
{default_param_entries}
    serde_json::to_string_pretty(&map).unwrap()
}}

pub fn get_model_metadata() -> String {{
    serde_json::json!({{
        "id": "{model_name}",
        "species": [
{metadata_species}
        ],
        "parameters": [
{metadata_parameters}
        ]
    }})
    .to_string()
}}
"#,
            model_name = c.model_name,
            param_fields = c.param_fields,
            init_fields = c.init_fields,
            param_extract = c.param_extract,
            init_bindings = c.init_bindings,
            static_rules = c.static_rules,
            initial_assignments = c.initial_assignments,
            root_fn = c.root_fn,
            species_extract = c.species_extract,
            dynamic_rules_rhs = c.dynamic_rules,
            temp_vars = c.temp_vars,
            rhs_block = c.rhs_block,
            dynamic_rules_jac = c.dynamic_rules,
            jac_block = c.jac_block,
            initial_state = c.initial_state,
            n_species = c.n_species,
            root_registration = c.root_registration,
            result_vectors_init = c.result_vectors_init,
            initial_pushes = c.initial_pushes,
            loop_pushes = c.loop_pushes,
            event_handling = c.event_handling,
            map_inserts = c.map_inserts,
            default_param_entries = c.default_param_entries,
            metadata_species = c.metadata_species,
            metadata_parameters = c.metadata_parameters,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_fields_are_optional() {
        let manager = TemplateManager::new();
        let (params, inits) = manager.struct_fields(
            &[("k1".to_string(), 0.5)],
            &[("A".to_string(), 1.0)],
        );
        assert_eq!(params.trim(), "pub k1: Option<f64>,");
        assert_eq!(inits.trim(), "pub init_a: Option<f64>,");
    }

    #[test]
    fn assembled_file_has_entry_points() {
        let manager = TemplateManager::new();
        let components = FileComponents {
            model_name: "test_model".into(),
            n_species: 2,
            ..Default::default()
        };
        let source = manager.assemble(&components);
        assert!(source.contains("pub fn run_simulation(params: &str) -> String"));
        assert!(source.contains("pub fn get_default_parameters() -> String"));
        assert!(source.contains("pub fn get_model_metadata() -> String"));
        assert!(source.contains("pub struct SimulationResult"));
        assert!(source.contains("pub struct SimulationParams"));
        assert!(source.contains(".init(init, 2)"));
        assert!(source.contains("solver.set_stop_time(final_time)"));
    }
}
