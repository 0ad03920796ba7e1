//! Code generation from validated models
//!
//! This module transforms a validated model record into a complete,
//! self-contained simulation source file: expressions are parsed and
//! inlined, the ODE system and sparse Jacobian are built symbolically,
//! shared subexpressions are extracted once across both, and the printed
//! blocks are assembled through the file template.

mod blocks;
mod events;
pub mod idents;
pub mod printer;
mod template;

pub use blocks::BlockGenerator;
pub use events::{EventCode, EventCodeGenerator};
pub use printer::RustPrinter;
pub use template::{FileComponents, TemplateManager};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::analysis::DependencyAnalyzer;
use crate::error::SbmlSolError;
use crate::expr::Expr;
use crate::model::ValidatedModel;
use crate::parser::{ParseContext, SbmlExpressionParser};
use crate::symbolic::{JacobianBuilder, OdeSystemBuilder, SymbolicOptimizer};

/// Options controlling compilation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Name used for the generated module header and metadata id
    pub model_name: String,
    /// 0 = no optimization, 1 = folding only, 2+ = CSE (default)
    pub optimization_level: u8,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            model_name: "sbml_model".to_string(),
            optimization_level: 2,
        }
    }
}

/// Generated source ready to be written into a runner crate
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    /// The complete module source text
    pub source: String,
    /// Parameter names (including qualified reaction-locals) in order
    pub parameters: Vec<String>,
    /// Species ids in state-vector order
    pub species: Vec<String>,
    /// Fraction of structurally nonzero Jacobian entries
    pub jacobian_sparsity: f64,
}

/// Code generator for validated models
pub struct CodeGenerator<'a> {
    model: &'a ValidatedModel,
    options: CodegenOptions,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(model: &'a ValidatedModel, options: CodegenOptions) -> Self {
        Self { model, options }
    }

    /// Run the whole pipeline and assemble the output file
    pub fn generate(&self) -> Result<GeneratedCode, SbmlSolError> {
        let model = self.model.inner();

        let merged = model.merge_parameters()?;
        let context = ParseContext::for_model(model, &merged)?;
        let parser = SbmlExpressionParser::new(&context);

        let species_order = model.species_order();
        let species_index = model.species_index();

        // 1. ODE system from reactions
        let ode = OdeSystemBuilder::new(&species_index).build(
            &model.reactions,
            &parser,
            &merged.renames,
        )?;

        // 2. sparse Jacobian
        let jacobian_builder = JacobianBuilder::new(&species_order);
        let jacobian = jacobian_builder.sparse(&ode);
        let jacobian_sparsity = if species_order.is_empty() {
            0.0
        } else {
            jacobian.len() as f64 / (species_order.len() * species_order.len()) as f64
        };
        let jacobian_exprs: Vec<Expr> =
            jacobian.iter().map(|entry| entry.expr.clone()).collect();

        // 3. joint CSE over derivatives and Jacobian
        let optimizer = SymbolicOptimizer::new(self.options.optimization_level);
        let mut reserved: BTreeSet<String> = context.symbols().clone();
        reserved.insert(ParseContext::TIME.to_string());
        let optimized = optimizer.optimize_combined(&ode, &jacobian_exprs, &reserved);

        // 4. rule classification
        let analyzer = DependencyAnalyzer::new(
            merged
                .parameters
                .iter()
                .map(|(name, _)| name.clone())
                .chain(model.compartments.keys().map(str::to_string)),
            species_order.iter().cloned(),
        );

        let initial_assignments: Vec<(String, Expr)> = model
            .initial_assignments
            .values()
            .map(|rule| Ok((rule.variable.clone(), parser.parse(&rule.math)?)))
            .collect::<Result<_, SbmlSolError>>()?;
        let initial_split = analyzer.classify_rules(&initial_assignments, &BTreeSet::new());
        let mut external_dynamic: BTreeSet<String> = BTreeSet::new();
        for (variable, _) in &initial_split.dynamic_rules {
            // a state-dependent initial assignment cannot be hoisted into
            // the generated preamble; it keeps its declared default instead
            tracing::warn!(
                variable = variable.as_str(),
                "initial assignment depends on state, skipped in generated code"
            );
            external_dynamic.insert(variable.clone());
        }

        let assignment_rules: Vec<(String, Expr)> = model
            .assignment_rules
            .values()
            .map(|rule| Ok((rule.variable.clone(), parser.parse(&rule.math)?)))
            .collect::<Result<_, SbmlSolError>>()?;
        let rule_split = analyzer.classify_rules(&assignment_rules, &external_dynamic);

        // variables computed by rules must not become config fields
        let mut rule_targets: BTreeSet<&str> = BTreeSet::new();
        rule_targets.extend(assignment_rules.iter().map(|(v, _)| v.as_str()));
        rule_targets.extend(initial_split.static_rules.iter().map(|(v, _)| v.as_str()));

        let mut config_parameters: Vec<(String, f64)> = merged
            .parameters
            .iter()
            .filter(|(name, _)| !rule_targets.contains(name.as_str()))
            .cloned()
            .collect();
        for (id, compartment) in model.compartments.iter() {
            let duplicate = config_parameters.iter().any(|(name, _)| name == id);
            if !duplicate && !rule_targets.contains(id) {
                config_parameters.push((id.to_string(), compartment.size_or_default()));
            }
        }

        let species_initials: Vec<(String, f64)> = model
            .species
            .iter()
            .map(|(id, species)| (id.to_string(), species.initial_value()))
            .collect();

        // 5. events
        let event_generator = EventCodeGenerator::new(&parser);
        let event_code = event_generator.generate(&model.events, &species_index);

        // 6. blocks and final assembly
        let blocks = BlockGenerator::new();
        let manager = TemplateManager::new();
        let (param_fields, init_fields) =
            manager.struct_fields(&config_parameters, &species_initials);
        let (metadata_species, metadata_parameters) =
            manager.metadata_entries(&species_initials, &config_parameters);

        let components = FileComponents {
            model_name: self.options.model_name.clone(),
            n_species: species_order.len(),
            param_fields,
            init_fields,
            param_extract: blocks.parameter_extraction(&config_parameters),
            init_bindings: blocks.initial_state_bindings(&species_initials),
            static_rules: blocks.rule_bindings(&rule_split.static_rules, "    "),
            initial_assignments: blocks.rule_bindings(&initial_split.static_rules, "    "),
            species_extract: blocks.species_extraction(&species_order),
            temp_vars: blocks.temp_vars(&optimized.replacements),
            dynamic_rules: blocks.rule_bindings(&rule_split.dynamic_rules, "        "),
            rhs_block: blocks.derivatives(&optimized.reduced_ode),
            jac_block: blocks.jacobian(&jacobian, &optimized.reduced_jacobian),
            initial_state: blocks.initial_state(&species_initials),
            result_vectors_init: blocks.result_vectors_init(&species_order),
            initial_pushes: blocks.result_pushes(&species_order, "    "),
            loop_pushes: blocks.result_pushes(&species_order, "                "),
            map_inserts: blocks.map_inserts(&species_order),
            root_fn: event_code.root_fn,
            event_handling: event_code.event_handling,
            root_registration: event_code.root_registration,
            default_param_entries: blocks.default_parameter_entries(&config_parameters),
            metadata_species,
            metadata_parameters,
        };

        Ok(GeneratedCode {
            source: manager.assemble(&components),
            parameters: config_parameters.into_iter().map(|(name, _)| name).collect(),
            species: species_order,
            jacobian_sparsity,
        })
    }
}
