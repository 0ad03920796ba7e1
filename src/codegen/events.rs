//! Event code generation
//!
//! Each event contributes one scalar root function to the integrator: the
//! boolean trigger is mapped to `(trigger as i32 as f64) - 0.5`, which
//! crosses zero exactly when the trigger flips. Event assignments become
//! match arms on the root index, mutating state through the solver.
//!
//! Two documented limitations are surfaced, never silently applied: event
//! delays are skipped with a warning, and assignments targeting parameters
//! (which the generated runtime cannot mutate mid-simulation) are skipped
//! with a warning.

use std::collections::HashMap;

use crate::codegen::printer::RustPrinter;
use crate::model::{EventData, OrderedMap};
use crate::parser::SbmlExpressionParser;

/// Generated event-handling fragments
#[derive(Debug, Clone, Default)]
pub struct EventCode {
    /// Root-function closure definition, empty when the model has no events
    pub root_fn: String,
    /// `Ok(RootFound)` match arm with per-event assignment arms
    pub event_handling: String,
    /// `.root(n, root_fn)` builder-call fragment
    pub root_registration: String,
}

/// Generates root functions and event callbacks
pub struct EventCodeGenerator<'a> {
    parser: &'a SbmlExpressionParser<'a>,
    printer: RustPrinter,
}

impl<'a> EventCodeGenerator<'a> {
    pub fn new(parser: &'a SbmlExpressionParser<'a>) -> Self {
        Self {
            parser,
            printer: RustPrinter::new(),
        }
    }

    pub fn generate(
        &self,
        events: &OrderedMap<EventData>,
        species_index: &HashMap<String, usize>,
    ) -> EventCode {
        if events.is_empty() {
            return EventCode::default();
        }

        EventCode {
            root_fn: self.root_function(events),
            event_handling: self.event_callback(events, species_index),
            root_registration: format!(".root({}, root_fn)", events.len()),
        }
    }

    fn root_function(&self, events: &OrderedMap<EventData>) -> String {
        let mut code = String::from(
            "    let root_fn = |y: &diffsol::NalgebraVec<f64>, _p: &diffsol::NalgebraVec<f64>, t: f64, roots: &mut diffsol::NalgebraVec<f64>| {\n",
        );

        for (index, (event_id, event)) in events.iter().enumerate() {
            if event.delay.is_some() {
                tracing::warn!(
                    event = event_id,
                    "event delay is not supported, trigger fires without delay"
                );
            }

            let Some(trigger) = &event.trigger else {
                code.push_str(&format!(
                    "        roots[{index}] = 1.0; // event {event_id}: no trigger\n"
                ));
                continue;
            };

            match self.parser.parse(trigger) {
                Ok(trigger) => {
                    let condition = self.printer.render_condition(&trigger);
                    code.push_str(&format!(
                        "        roots[{index}] = (({condition}) as i32 as f64) - 0.5;\n"
                    ));
                }
                Err(error) => {
                    tracing::warn!(
                        event = event_id,
                        %error,
                        "could not parse event trigger, root disabled"
                    );
                    code.push_str(&format!(
                        "        roots[{index}] = 1.0; // event {event_id}: unparsable trigger\n"
                    ));
                }
            }
        }

        code.push_str("    };\n");
        code
    }

    fn event_callback(
        &self,
        events: &OrderedMap<EventData>,
        species_index: &HashMap<String, usize>,
    ) -> String {
        let mut code = String::from(
            "            Ok(OdeSolverStopReason::RootFound(root_idx)) => {\n",
        );
        code.push_str(
            "                eprintln!(\"event triggered at t={}\", solver.state().t);\n",
        );
        code.push_str("                match root_idx as usize {\n");

        for (index, (event_id, event)) in events.iter().enumerate() {
            code.push_str(&format!("                    {index} => {{\n"));

            for assignment in &event.event_assignments {
                let Some(math) = &assignment.math else {
                    continue;
                };
                let value = match self.parser.parse(math) {
                    Ok(value) => value,
                    Err(error) => {
                        tracing::warn!(
                            event = event_id,
                            variable = assignment.variable.as_str(),
                            %error,
                            "could not parse event assignment, skipped"
                        );
                        continue;
                    }
                };

                match species_index.get(&assignment.variable) {
                    Some(&state_index) => {
                        let rendered = self.printer.render(&value);
                        code.push_str(&format!(
                            "                        solver.state_mut().y[{state_index}] = {rendered};\n"
                        ));
                    }
                    None => {
                        // the generated runtime cannot mutate parameters
                        // mid-simulation; documented limitation
                        tracing::warn!(
                            event = event_id,
                            variable = assignment.variable.as_str(),
                            "event assignment targets a non-state variable, skipped"
                        );
                        code.push_str(&format!(
                            "                        // assignment to '{}' skipped: only state variables can change mid-run\n",
                            assignment.variable,
                        ));
                    }
                }
            }

            code.push_str("                    },\n");
        }

        code.push_str("                    _ => {},\n");
        code.push_str("                }\n");
        code.push_str("            },\n");
        code
    }
}
