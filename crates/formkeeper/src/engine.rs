//! Record engine: recomputes calculated fields until they settle.
//!
//! Formulas may reference other calculated fields (`cost_per_night` reads
//! `annual_cost_total`, which reads `annual_loan_cost`), so one pass in
//! declaration order is not always enough. The engine repeats passes until
//! nothing changes, bounded by [`MAX_PASSES`] so that cyclic formulas cannot
//! loop forever.

use tracing::{trace, warn};

use crate::formula::{evaluate, Scope};
use crate::record::{Record, Value};
use crate::schema::Schema;

/// Upper bound on recomputation passes.
pub const MAX_PASSES: usize = 10;

/// Outcome of a computation.
#[derive(Debug, Clone, PartialEq)]
pub struct Computation {
    /// The draft with calculated fields filled in.
    pub record: Record,
    /// Number of passes run.
    pub passes: usize,
    /// Whether a pass completed without changes before the cap.
    pub converged: bool,
}

/// Compute every calculated field of `draft`.
///
/// Never fails: a formula that does not produce a finite number leaves its
/// field empty without affecting the others.
#[must_use]
pub fn compute_record(schema: &Schema, draft: &Record) -> Record {
    compute_with_report(schema, draft).record
}

/// Like [`compute_record`], also reporting how many passes were needed.
///
/// The scope is seeded with the draft's input values only. Calculated fields
/// start empty, so values left over from an earlier computation never feed
/// back into this one.
#[must_use]
pub fn compute_with_report(schema: &Schema, draft: &Record) -> Computation {
    let formulas: Vec<(&str, &str)> = schema
        .calculated_fields()
        .filter(|(_, formula)| !formula.trim().is_empty())
        .map(|(field, formula)| (field.id.as_str(), formula))
        .collect();

    let mut scope: Scope = draft.values.clone();
    for (field, _) in schema.calculated_fields() {
        scope.insert(field.id.clone(), Value::Empty);
    }

    let mut passes = 0;
    let mut converged = false;
    while passes < MAX_PASSES {
        passes += 1;
        let mut changed = false;

        for (id, formula) in &formulas {
            let Some(result) = evaluate(formula, &scope) else {
                continue;
            };
            if scope.get(*id).and_then(Value::as_number) != Some(result) {
                trace!(field = id, value = result, pass = passes, "calculated field updated");
                scope.insert((*id).to_string(), Value::Number(result));
                changed = true;
            }
        }

        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            passes,
            "calculated fields did not settle; formulas may be cyclic"
        );
    }

    let mut record = draft.clone();
    for (field, _) in schema.calculated_fields() {
        let value = scope.remove(&field.id).unwrap_or_default();
        record.values.insert(field.id.clone(), value);
    }

    Computation {
        record,
        passes,
        converged,
    }
}
