//! End-to-end pipeline tests
//!
//! These exercise the complete path from a reader-produced model record to
//! generated simulation source.

use sbmlsol::{
    compile, compile_json, model_info, parse_model, validate_model, CodegenOptions, SbmlSolError,
};

fn options(level: u8) -> CodegenOptions {
    CodegenOptions {
        model_name: "test_model".to_string(),
        optimization_level: level,
    }
}

/// A -> B with rate k1 * A, the canonical two-species conversion
fn conversion_model() -> &'static str {
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
    }"#
}

// ═══════════════════════════════════════════════════════════════════════════════
// End-to-End Scenario
// ═══════════════════════════════════════════════════════════════════════════════

mod end_to_end {
    use super::*;

    #[test]
    fn conversion_model_compiles_with_expected_derivatives() {
        let generated = compile_json(conversion_model(), &options(0)).unwrap();

        assert_eq!(generated.species, vec!["A", "B"]);
        assert!(generated.parameters.contains(&"k1".to_string()));

        // derivative closure: dy[A] = -(k1*A), dy[B] = k1*A
        assert!(generated.source.contains("dy[0] = -(k1 * A);"));
        assert!(generated.source.contains("dy[1] = k1 * A;"));

        // exactly two nonzero Jacobian entries, both in column A
        assert!(generated.source.contains("jv[0] += (-k1) * v[0];"));
        assert!(generated.source.contains("jv[1] += (k1) * v[0];"));
        assert_eq!(generated.source.matches("jv[").count(), 3); // 2 entries + zeroing loop

        // result type with per-species trajectories and time
        assert!(generated
            .source
            .contains("pub species: HashMap<String, Vec<f64>>"));
        assert!(generated.source.contains("pub time: Vec<f64>,"));
    }

    #[test]
    fn jacobian_sparsity_is_reported() {
        let generated = compile_json(conversion_model(), &options(2)).unwrap();
        // two nonzero entries out of four
        assert!((generated.jacobian_sparsity - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cse_extracts_the_shared_rate_term() {
        let generated = compile_json(conversion_model(), &options(2)).unwrap();
        // k1*A appears in both derivatives; level 2 names it once
        assert!(generated.source.contains("let x0 = k1 * A;"));
        assert!(generated.source.contains("dy[0] = -x0;"));
        assert!(generated.source.contains("dy[1] = x0;"));
    }

    #[test]
    fn state_extraction_and_initial_values_are_emitted() {
        let generated = compile_json(conversion_model(), &options(2)).unwrap();
        assert!(generated.source.contains("let A = y[0];"));
        assert!(generated.source.contains("let B = y[1];"));
        assert!(generated
            .source
            .contains("let init_a = sim_params.init_a.unwrap_or(1.0);"));
        assert!(generated.source.contains("y[0] = init_a;"));
        assert!(generated
            .source
            .contains("let init_b = sim_params.init_b.unwrap_or(0.0);"));
        assert!(generated.source.contains("y[1] = init_b;"));
    }

    #[test]
    fn parameters_are_individually_optional() {
        let generated = compile_json(conversion_model(), &options(2)).unwrap();
        assert!(generated.source.contains("pub k1: Option<f64>,"));
        assert!(generated.source.contains("pub cell: Option<f64>,"));
        assert!(generated
            .source
            .contains("let k1 = sim_params.k1.unwrap_or(0.5);"));
        assert!(generated.source.contains("pub final_time: Option<f64>,"));
    }

    #[test]
    fn metadata_endpoints_are_emitted() {
        let generated = compile_json(conversion_model(), &options(2)).unwrap();
        assert!(generated
            .source
            .contains("pub fn get_default_parameters() -> String"));
        assert!(generated
            .source
            .contains("pub fn get_model_metadata() -> String"));
        assert!(generated
            .source
            .contains("map.insert(\"k1\".to_string(), 0.5);"));
        assert!(generated.source.contains("\"id\": \"test_model\""));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Leniency and Rejection
// ═══════════════════════════════════════════════════════════════════════════════

mod model_boundaries {
    use super::*;

    #[test]
    fn unknown_species_in_reaction_is_tolerated() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
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
                    "products": [[1.0, "Ghost"]],
                    "rateLaw": "k1 * A",
                    "rxnParameters": []
                }
            }
        }"#;
        let generated = compile_json(json, &options(0)).unwrap();
        assert!(generated.source.contains("dy[0] = -(k1 * A);"));
    }

    #[test]
    fn rate_rules_are_rejected() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
            },
            "rateRules": {
                "rr1": { "Id": "rr1", "variable": "A", "math": "0.1 * A" }
            }
        }"#;
        match validate_model(json) {
            Err(SbmlSolError::UnsupportedConstruct { construct, .. }) => {
                assert_eq!(construct, "rate rule");
            }
            other => panic!("expected unsupported-construct error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_rate_law_aborts_compilation() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
            },
            "parameters": {
                "k1": { "Id": "k1", "value": 0.5, "isConstant": true }
            },
            "reactions": {
                "r1": {
                    "Id": "r1",
                    "reactants": [[1.0, "A"]],
                    "products": [],
                    "rateLaw": "k1 * (A",
                    "rxnParameters": []
                }
            }
        }"#;
        assert!(compile_json(json, &options(2)).is_err());
    }

    #[test]
    fn unknown_identifier_in_rate_law_fails() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
            },
            "reactions": {
                "r1": {
                    "Id": "r1",
                    "reactants": [[1.0, "A"]],
                    "products": [],
                    "rateLaw": "mystery * A",
                    "rxnParameters": []
                }
            }
        }"#;
        match compile_json(json, &options(2)) {
            Err(SbmlSolError::UnknownIdentifier { name, .. }) => {
                assert_eq!(name, "mystery");
            }
            other => panic!("expected unknown-identifier error, got {other:?}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════════════════════════════════════════

mod rules {
    use super::*;

    #[test]
    fn static_rules_are_hoisted_in_dependency_order() {
        // V2 is declared before V1 but depends on it
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
            },
            "parameters": {
                "k1": { "Id": "k1", "value": 0.5, "isConstant": true },
                "k2": { "Id": "k2", "value": 2.0, "isConstant": true }
            },
            "assignmentRules": {
                "ar2": { "Id": "ar2", "variable": "V2", "math": "V1 + k2" },
                "ar1": { "Id": "ar1", "variable": "V1", "math": "k1 * 2" }
            },
            "reactions": {
                "r1": {
                    "Id": "r1",
                    "reactants": [[1.0, "A"]],
                    "products": [],
                    "rateLaw": "V2 * A",
                    "rxnParameters": []
                }
            }
        }"#;
        let generated = compile_json(json, &options(2)).unwrap();
        let v1_pos = generated.source.find("let V1 = ").unwrap();
        let v2_pos = generated.source.find("let V2 = ").unwrap();
        assert!(v1_pos < v2_pos, "V1 must be defined before V2");
        // hoisted out of the closures: defined before the rhs closure
        let rhs_pos = generated.source.find("let rhs =").unwrap();
        assert!(v2_pos < rhs_pos);
    }

    #[test]
    fn dynamic_rules_are_recomputed_inside_closures() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
            },
            "parameters": {
                "k1": { "Id": "k1", "value": 0.5, "isConstant": true }
            },
            "assignmentRules": {
                "ar1": { "Id": "ar1", "variable": "Vd", "math": "A * k1" }
            },
            "reactions": {
                "r1": {
                    "Id": "r1",
                    "reactants": [[1.0, "A"]],
                    "products": [],
                    "rateLaw": "Vd",
                    "rxnParameters": []
                }
            }
        }"#;
        let generated = compile_json(json, &options(2)).unwrap();
        // once in the rhs closure, once in the jacobian closure
        assert_eq!(generated.source.matches("let Vd = A * k1;").count(), 2);
        let rhs_pos = generated.source.find("let rhs =").unwrap();
        let vd_pos = generated.source.find("let Vd = ").unwrap();
        assert!(vd_pos > rhs_pos, "dynamic rule must live inside a closure");
    }

    #[test]
    fn circular_rules_terminate_and_compile() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
            },
            "parameters": {
                "k1": { "Id": "k1", "value": 0.5, "isConstant": true },
                "k2": { "Id": "k2", "value": 2.0, "isConstant": true }
            },
            "assignmentRules": {
                "ar1": { "Id": "ar1", "variable": "V1", "math": "V2 + k1" },
                "ar2": { "Id": "ar2", "variable": "V2", "math": "V1 + k2" }
            },
            "reactions": {
                "r1": {
                    "Id": "r1",
                    "reactants": [[1.0, "A"]],
                    "products": [],
                    "rateLaw": "k1 * A",
                    "rxnParameters": []
                }
            }
        }"#;
        // the lenient classifier must not hang; both rules fall into the
        // dynamic bucket and the model still compiles
        let generated = compile_json(json, &options(2)).unwrap();
        let rhs_pos = generated.source.find("let rhs =").unwrap();
        assert!(generated.source.find("let V1 = ").unwrap() > rhs_pos);
        assert!(generated.source.find("let V2 = ").unwrap() > rhs_pos);
    }

    #[test]
    fn rule_targets_are_not_config_parameters() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" }
            },
            "parameters": {
                "k1": { "Id": "k1", "value": 0.5, "isConstant": true },
                "V1": { "Id": "V1", "value": 0.0, "isConstant": false }
            },
            "assignmentRules": {
                "ar1": { "Id": "ar1", "variable": "V1", "math": "k1 * 2" }
            },
            "reactions": {
                "r1": {
                    "Id": "r1",
                    "reactants": [[1.0, "A"]],
                    "products": [],
                    "rateLaw": "V1 * A",
                    "rxnParameters": []
                }
            }
        }"#;
        let generated = compile_json(json, &options(2)).unwrap();
        assert!(!generated.parameters.contains(&"V1".to_string()));
        assert!(!generated.source.contains("pub V1: Option<f64>,"));
        assert!(generated.source.contains("let V1 = k1 * 2.0;"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Reaction-Local Parameters
// ═══════════════════════════════════════════════════════════════════════════════

mod local_parameters {
    use super::*;

    #[test]
    fn colliding_local_parameter_is_qualified_in_generated_code() {
        let json = r#"{
            "species": {
                "A": { "Id": "A", "value": 1.0, "compartment": "cell" },
                "B": { "Id": "B", "value": 0.0, "compartment": "cell" }
            },
            "parameters": {
                "k1": { "Id": "k1", "value": 0.5, "isConstant": true }
            },
            "reactions": {
                "r1": {
                    "Id": "r1",
                    "reactants": [[1.0, "A"]],
                    "products": [[1.0, "B"]],
                    "rateLaw": "k1 * A",
                    "rxnParameters": []
                },
                "r2": {
                    "Id": "r2",
                    "reactants": [[1.0, "B"]],
                    "products": [[1.0, "A"]],
                    "rateLaw": "k1 * B",
                    "rxnParameters": [["k1", 0.1]]
                }
            }
        }"#;
        let generated = compile_json(json, &options(0)).unwrap();
        assert!(generated.parameters.contains(&"r2_k1".to_string()));
        // r2's rate law uses the qualified name, r1's keeps the global
        assert!(generated.source.contains("dy[1] = -(r2_k1 * B) + k1 * A;")
            || generated.source.contains("r2_k1 * B"));
        assert!(generated
            .source
            .contains("let r2_k1 = sim_params.r2_k1.unwrap_or(0.1);"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════════

mod events {
    use super::*;

    fn event_model(delay: Option<&str>) -> String {
        let delay = match delay {
            Some(delay) => format!(r#""delay": "{}","#, delay),
            None => String::new(),
        };
        format!(
            r#"{{
                "species": {{
                    "A": {{ "Id": "A", "value": 1.0, "compartment": "cell" }}
                }},
                "parameters": {{
                    "k1": {{ "Id": "k1", "value": 0.5, "isConstant": true }}
                }},
                "reactions": {{
                    "r1": {{
                        "Id": "r1",
                        "reactants": [[1.0, "A"]],
                        "products": [],
                        "rateLaw": "k1 * A",
                        "rxnParameters": []
                    }}
                }},
                "events": {{
                    "dose": {{
                        "Id": "dose",
                        "trigger": "gt(t, 5.0)",
                        {delay}
                        "useValuesFromTriggerTime": true,
                        "eventAssignments": [
                            {{ "variable": "A", "math": "A + 10.0" }},
                            {{ "variable": "k1", "math": "0.1" }}
                        ]
                    }}
                }}
            }}"#
        )
    }

    #[test]
    fn event_emits_root_function_and_assignment() {
        let generated = compile_json(&event_model(None), &options(2)).unwrap();
        assert!(generated
            .source
            .contains("roots[0] = ((t > 5.0) as i32 as f64) - 0.5;"));
        assert!(generated.source.contains(".root(1, root_fn)"));
        assert!(generated
            .source
            .contains("solver.state_mut().y[0] = A + 10.0;"));
    }

    #[test]
    fn parameter_event_assignment_is_skipped() {
        let generated = compile_json(&event_model(None), &options(2)).unwrap();
        // the parameter assignment must not mutate state, only leave a note
        assert!(!generated.source.contains("= 0.1;"));
        assert!(generated.source.contains("assignment to 'k1' skipped"));
    }

    #[test]
    fn event_delay_is_ignored_not_fatal() {
        let generated = compile_json(&event_model(Some("5.0")), &options(2)).unwrap();
        // the event still registers a root; the delay is warned about
        assert!(generated.source.contains(".root(1, root_fn)"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Facade
// ═══════════════════════════════════════════════════════════════════════════════

mod facade {
    use super::*;

    #[test]
    fn model_info_summarizes_the_record() {
        let model = parse_model(conversion_model()).unwrap();
        let info = model_info(&model);
        assert_eq!(info.num_species, 2);
        assert_eq!(info.num_parameters, 1);
        assert_eq!(info.num_reactions, 1);
        assert_eq!(info.species, vec!["A", "B"]);
    }

    #[test]
    fn compile_accepts_validated_models() {
        let validated = validate_model(conversion_model()).unwrap();
        let generated = compile(&validated, &options(2)).unwrap();
        assert!(!generated.source.is_empty());
    }
}
