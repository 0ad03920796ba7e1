//! ODE system construction from reaction stoichiometry

use std::collections::HashMap;

use crate::error::SbmlSolError;
use crate::expr::Expr;
use crate::model::{OrderedMap, ReactionData};
use crate::parser::SbmlExpressionParser;

/// Builds one derivative expression per state variable
pub struct OdeSystemBuilder<'a> {
    species_index: &'a HashMap<String, usize>,
}

impl<'a> OdeSystemBuilder<'a> {
    pub fn new(species_index: &'a HashMap<String, usize>) -> Self {
        Self { species_index }
    }

    pub fn species_count(&self) -> usize {
        self.species_index.len()
    }

    /// Accumulate every reaction's rate into the derivative vector.
    ///
    /// Each rate law is parsed once; reactant terms subtract
    /// `stoichiometry * rate`, product terms add it. A species id missing
    /// from the index map is skipped — the model may reference species
    /// outside the simulated subset — but a rate law that fails to parse
    /// aborts the whole build, since a silently missing term would corrupt
    /// the system.
    ///
    /// `renames` carries per-reaction symbol renames for qualified
    /// reaction-local parameters, applied to the parsed rate law.
    pub fn build(
        &self,
        reactions: &OrderedMap<ReactionData>,
        parser: &SbmlExpressionParser,
        renames: &HashMap<String, HashMap<String, String>>,
    ) -> Result<Vec<Expr>, SbmlSolError> {
        let mut dy_dt = vec![Expr::zero(); self.species_index.len()];

        tracing::debug!(reactions = reactions.len(), "parsing reactions");
        for (rxn_id, reaction) in reactions.iter() {
            let mut rate = parser.parse(&reaction.rate_law).map_err(|error| {
                tracing::error!(reaction = rxn_id, %error, "failed to parse rate law");
                error
            })?;

            if let Some(renames) = renames.get(rxn_id) {
                rate = rate.map_symbols(&|symbol| {
                    renames.get(symbol).map(|renamed| Expr::symbol(renamed.clone()))
                });
            }

            for (stoichiometry, species_id) in &reaction.reactants {
                match self.species_index.get(species_id) {
                    Some(&index) => {
                        dy_dt[index] = std::mem::replace(&mut dy_dt[index], Expr::zero())
                            - Expr::number(*stoichiometry) * rate.clone();
                    }
                    None => {
                        tracing::debug!(
                            reaction = rxn_id,
                            species = species_id.as_str(),
                            "reactant not in species index, skipped"
                        );
                    }
                }
            }

            for (stoichiometry, species_id) in &reaction.products {
                match self.species_index.get(species_id) {
                    Some(&index) => {
                        dy_dt[index] = std::mem::replace(&mut dy_dt[index], Expr::zero())
                            + Expr::number(*stoichiometry) * rate.clone();
                    }
                    None => {
                        tracing::debug!(
                            reaction = rxn_id,
                            species = species_id.as_str(),
                            "product not in species index, skipped"
                        );
                    }
                }
            }
        }

        Ok(dy_dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseContext;

    fn setup() -> (HashMap<String, usize>, ParseContext) {
        let index: HashMap<String, usize> =
            [("A".to_string(), 0), ("B".to_string(), 1)].into_iter().collect();
        let context = ParseContext::new(
            ["A", "B", "k1"].iter().map(|s| s.to_string()),
            &[],
        )
        .unwrap();
        (index, context)
    }

    fn reaction(id: &str, reactants: Vec<(f64, &str)>, products: Vec<(f64, &str)>, rate: &str) -> ReactionData {
        ReactionData {
            id: id.into(),
            name: None,
            reactants: reactants
                .into_iter()
                .map(|(s, id)| (s, id.to_string()))
                .collect(),
            products: products
                .into_iter()
                .map(|(s, id)| (s, id.to_string()))
                .collect(),
            rate_law: rate.into(),
            rxn_parameters: vec![],
        }
    }

    #[test]
    fn reactant_and_product_terms_are_additive_inverses() {
        let (index, context) = setup();
        let parser = SbmlExpressionParser::new(&context);
        let mut reactions = OrderedMap::new();
        reactions.insert("r1", reaction("r1", vec![(1.0, "A")], vec![(1.0, "B")], "k1 * A"));

        let ode = OdeSystemBuilder::new(&index)
            .build(&reactions, &parser, &HashMap::new())
            .unwrap();

        let rate = Expr::symbol("k1") * Expr::symbol("A");
        assert_eq!(ode[0], -rate.clone());
        assert_eq!(ode[1], rate);
        // symbolically, ode[A] + ode[B] = 0
        assert!((ode[0].clone() + ode[1].clone()).simplify().is_zero());
    }

    #[test]
    fn unknown_species_is_skipped_without_error() {
        let (index, context) = setup();
        let parser = SbmlExpressionParser::new(&context);
        let mut reactions = OrderedMap::new();
        reactions.insert(
            "r1",
            reaction("r1", vec![(1.0, "A")], vec![(1.0, "Ghost")], "k1 * A"),
        );

        let ode = OdeSystemBuilder::new(&index)
            .build(&reactions, &parser, &HashMap::new())
            .unwrap();

        assert!(!ode[0].is_zero());
        assert!(ode[1].is_zero());
    }

    #[test]
    fn stoichiometric_coefficients_scale_terms() {
        let (index, context) = setup();
        let parser = SbmlExpressionParser::new(&context);
        let mut reactions = OrderedMap::new();
        reactions.insert("r1", reaction("r1", vec![(2.0, "A")], vec![(1.0, "B")], "k1 * A"));

        let ode = OdeSystemBuilder::new(&index)
            .build(&reactions, &parser, &HashMap::new())
            .unwrap();

        let rate = Expr::symbol("k1") * Expr::symbol("A");
        assert_eq!(ode[0], -(Expr::number(2.0) * rate));
    }

    #[test]
    fn rate_law_parse_failure_is_fatal() {
        let (index, context) = setup();
        let parser = SbmlExpressionParser::new(&context);
        let mut reactions = OrderedMap::new();
        reactions.insert(
            "r1",
            reaction("r1", vec![(1.0, "A")], vec![], "k1 * (A"),
        );

        let result = OdeSystemBuilder::new(&index).build(&reactions, &parser, &HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn multiple_reactions_accumulate() {
        let (index, context) = setup();
        let parser = SbmlExpressionParser::new(&context);
        let mut reactions = OrderedMap::new();
        reactions.insert("r1", reaction("r1", vec![(1.0, "A")], vec![(1.0, "B")], "k1 * A"));
        reactions.insert("r2", reaction("r2", vec![(1.0, "B")], vec![(1.0, "A")], "k1 * B"));

        let ode = OdeSystemBuilder::new(&index)
            .build(&reactions, &parser, &HashMap::new())
            .unwrap();

        let symbols = ode[0].free_symbols();
        assert!(symbols.contains("A") && symbols.contains("B"));
    }
}
