//! Rule dependency analysis
//!
//! Assignment rules split into two buckets: *static* rules depend only on
//! model constants (directly or through other static rules) and can be
//! evaluated once per run, outside the integration loop; *dynamic* rules
//! touch state variables or time and must be recomputed at every solver
//! evaluation. Classification is a bounded fixed-point iteration, and the
//! static bucket is then topologically sorted so each rule can be emitted
//! as a single `let` with no forward references.
//!
//! The classifier is deliberately best-effort: a symbol that is neither a
//! known constant nor another rule is treated as dynamic rather than
//! rejected, and rules still unclassified when the passes are exhausted
//! (mutual dependency) are forced into the dynamic bucket. The strict
//! entry point [`sort_strict`] is the opposite contract — a residual cycle
//! there is an error.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::SbmlSolError;
use crate::expr::Expr;
use crate::parser::ParseContext;

/// A named rule: target variable and its parsed right-hand side
pub type Rule = (String, Expr);

/// Result of classifying a rule set
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Constant-only rules in topological order
    pub static_rules: Vec<Rule>,
    /// State- or time-dependent rules, declaration order
    pub dynamic_rules: Vec<Rule>,
}

/// Classifier configured with the model's constant and state namespaces
#[derive(Debug)]
pub struct DependencyAnalyzer {
    static_symbols: BTreeSet<String>,
    dynamic_symbols: BTreeSet<String>,
}

impl DependencyAnalyzer {
    /// `static_symbols` are parameters and compartments; `dynamic_symbols`
    /// are species. Time is always dynamic.
    pub fn new(
        static_symbols: impl IntoIterator<Item = String>,
        dynamic_symbols: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut dynamic: BTreeSet<String> = dynamic_symbols.into_iter().collect();
        dynamic.insert(ParseContext::TIME.to_string());
        dynamic.insert("time".to_string());
        Self {
            static_symbols: static_symbols.into_iter().collect(),
            dynamic_symbols: dynamic,
        }
    }

    /// Partition `rules` into static and dynamic buckets.
    ///
    /// `external_dynamic` names variables already known to be dynamic for
    /// reasons outside this rule set (for example initial assignments that
    /// read state). Never fails: unclassifiable rules land in the dynamic
    /// bucket after `rules.len() + 1` passes without progress.
    pub fn classify_rules(
        &self,
        rules: &[Rule],
        external_dynamic: &BTreeSet<String>,
    ) -> Classification {
        let rule_map: HashMap<&str, &Expr> = rules
            .iter()
            .map(|(var, expr)| (var.as_str(), expr))
            .collect();

        let mut static_vars = self.static_symbols.clone();
        let mut dynamic_vars = self.dynamic_symbols.clone();
        dynamic_vars.extend(external_dynamic.iter().cloned());

        let mut classified: HashSet<String> = HashSet::new();
        let mut static_list: Vec<Rule> = Vec::new();
        let mut dynamic_list: Vec<Rule> = Vec::new();

        let max_passes = rules.len() + 1;
        for _ in 0..max_passes {
            if classified.len() == rules.len() {
                break;
            }
            let mut made_progress = false;

            for (var, expr) in rules {
                if classified.contains(var) {
                    continue;
                }

                let mut is_dynamic = false;
                let mut depends_on_unclassified = false;
                for symbol in expr.free_symbols() {
                    if dynamic_vars.contains(&symbol) {
                        is_dynamic = true;
                        break;
                    }
                    if rule_map.contains_key(symbol.as_str()) {
                        if !classified.contains(&symbol) {
                            depends_on_unclassified = true;
                            break;
                        }
                    } else if !static_vars.contains(&symbol) {
                        // neither a constant nor a rule: conservatively
                        // dynamic, never silently dropped
                        is_dynamic = true;
                        break;
                    }
                }

                if is_dynamic {
                    dynamic_list.push((var.clone(), expr.clone()));
                    dynamic_vars.insert(var.clone());
                    classified.insert(var.clone());
                    made_progress = true;
                } else if !depends_on_unclassified {
                    static_list.push((var.clone(), expr.clone()));
                    static_vars.insert(var.clone());
                    classified.insert(var.clone());
                    made_progress = true;
                }
            }

            if !made_progress {
                let remaining: Vec<&str> = rules
                    .iter()
                    .filter(|(var, _)| !classified.contains(var))
                    .map(|(var, _)| var.as_str())
                    .collect();
                if !remaining.is_empty() {
                    tracing::warn!(
                        rules = ?remaining,
                        "rules could not be classified (mutual dependency), treating as dynamic"
                    );
                    for (var, expr) in rules {
                        if classified.insert(var.clone()) {
                            dynamic_list.push((var.clone(), expr.clone()));
                        }
                    }
                }
                break;
            }
        }

        Classification {
            static_rules: self.sort_static(static_list, &rule_map),
            dynamic_rules: dynamic_list,
        }
    }

    /// Order static rules so every dependency precedes its dependent.
    /// A residual cycle degrades to declaration order with a warning; the
    /// classifier has already guaranteed these rules only reference
    /// constants and each other.
    fn sort_static(&self, rules: Vec<Rule>, rule_map: &HashMap<&str, &Expr>) -> Vec<Rule> {
        let mut dependencies: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (var, expr) in &rules {
            let deps: BTreeSet<String> = expr
                .free_symbols()
                .into_iter()
                .filter(|symbol| {
                    symbol != var && rule_map.contains_key(symbol.as_str())
                })
                .collect();
            dependencies.insert(var.clone(), deps);
        }

        let mut defined: BTreeSet<String> = self.static_symbols.clone();
        let mut sorted: Vec<Rule> = Vec::new();
        let mut remaining: Vec<Rule> = rules;

        let max_passes = remaining.len() + 1;
        for _ in 0..max_passes {
            if remaining.is_empty() {
                break;
            }
            let (ready, deferred): (Vec<Rule>, Vec<Rule>) =
                remaining.into_iter().partition(|(var, _)| {
                    dependencies
                        .get(var)
                        .map(|deps| deps.iter().all(|dep| defined.contains(dep)))
                        .unwrap_or(true)
                });

            if ready.is_empty() {
                tracing::warn!(
                    remaining = deferred.len(),
                    "static rule ordering could not be fully resolved, keeping declaration order"
                );
                sorted.extend(deferred);
                return sorted;
            }

            for (var, expr) in ready {
                defined.insert(var.clone());
                sorted.push((var, expr));
            }
            remaining = deferred;
        }

        sorted
    }
}

/// Strict topological sort over rule-to-rule dependencies.
///
/// Kahn's algorithm; a cycle is a hard [`SbmlSolError::CircularDependency`]
/// listing the unresolved variables. Use this where ordering is a
/// correctness requirement rather than a hoisting optimization.
pub fn sort_strict(rules: &[Rule]) -> Result<Vec<Rule>, SbmlSolError> {
    let rule_map: HashMap<&str, &Expr> = rules
        .iter()
        .map(|(var, expr)| (var.as_str(), expr))
        .collect();

    let mut dependencies: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for (var, expr) in rules {
        let deps: BTreeSet<&str> = expr
            .free_symbols()
            .into_iter()
            .filter_map(|symbol| {
                rule_map
                    .get_key_value(symbol.as_str())
                    .map(|(key, _)| *key)
                    .filter(|key| *key != var.as_str())
            })
            .collect();
        dependencies.insert(var.as_str(), deps);
    }

    let mut in_degree: HashMap<&str, usize> = dependencies
        .iter()
        .map(|(var, deps)| (*var, deps.len()))
        .collect();

    // seed with declaration order for deterministic output
    let mut queue: Vec<&str> = rules
        .iter()
        .map(|(var, _)| var.as_str())
        .filter(|var| in_degree[var] == 0)
        .collect();
    let mut sorted_vars: Vec<&str> = Vec::new();

    while let Some(current) = queue.first().copied() {
        queue.remove(0);
        sorted_vars.push(current);
        for (var, deps) in &dependencies {
            if deps.contains(current) {
                let degree = in_degree.get_mut(var).expect("var registered above");
                *degree -= 1;
                if *degree == 0 {
                    queue.push(var);
                }
            }
        }
    }

    if sorted_vars.len() != rules.len() {
        let mut unresolved: Vec<String> = rules
            .iter()
            .map(|(var, _)| var.clone())
            .filter(|var| !sorted_vars.contains(&var.as_str()))
            .collect();
        unresolved.sort();
        return Err(SbmlSolError::CircularDependency(unresolved));
    }

    let by_name: HashMap<&str, &Rule> = rules
        .iter()
        .map(|rule| (rule.0.as_str(), rule))
        .collect();
    Ok(sorted_vars
        .into_iter()
        .map(|var| (*by_name[var]).clone())
        .collect())
}
