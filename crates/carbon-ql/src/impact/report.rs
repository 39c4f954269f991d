use super::component::CanonicalComponentConfig;
use super::error::{EvaluationError, ValidationError};
use super::evaluator::{ImpactEstimate, ImpactEvaluator};
use super::scenario::{Scenarios, UsageScenario};
use rayon::prelude::*;
use serde::Serialize;

/// Result for one batch element.
pub type ScenarioOutcome = Result<ImpactEstimate, EvaluationError>;

/// Aggregated evaluation output, shaped like the scenario input.
#[derive(Debug)]
pub enum ImpactReport {
    Single(ImpactEstimate),
    Batch(Vec<ScenarioOutcome>),
}

impl ImpactReport {
    /// Successful estimates in input order.
    pub fn estimates(&self) -> Vec<&ImpactEstimate> {
        match self {
            ImpactReport::Single(estimate) => vec![estimate],
            ImpactReport::Batch(outcomes) => outcomes
                .iter()
                .filter_map(|outcome| outcome.as_ref().ok())
                .collect(),
        }
    }

    pub fn view(&self) -> ReportView {
        match self {
            ImpactReport::Single(estimate) => ReportView::Single(estimate.clone()),
            ImpactReport::Batch(outcomes) => {
                ReportView::Batch(outcomes.iter().map(OutcomeView::from).collect())
            }
        }
    }
}

/// Serializable form of an [`ImpactReport`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportView {
    Single(ImpactEstimate),
    Batch(Vec<OutcomeView>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutcomeView {
    Estimate(ImpactEstimate),
    Failed {
        error: String,
        kind: &'static str,
        retryable: bool,
    },
}

impl From<&ScenarioOutcome> for OutcomeView {
    fn from(outcome: &ScenarioOutcome) -> Self {
        match outcome {
            Ok(estimate) => OutcomeView::Estimate(estimate.clone()),
            Err(err) => OutcomeView::Failed {
                error: err.to_string(),
                kind: err.kind(),
                retryable: err.is_retryable(),
            },
        }
    }
}

/// Evaluate a single scenario or a batch.
///
/// A single scenario fails the call on any error. Batch elements are evaluated
/// in parallel and returned in input order with failures isolated per element,
/// except for an unavailable coefficient source, which aborts the whole batch.
pub fn evaluate_all(
    evaluator: &ImpactEvaluator,
    config: &CanonicalComponentConfig,
    scenarios: Scenarios,
) -> Result<ImpactReport, EvaluationError> {
    match scenarios {
        Scenarios::Single(scenario) => evaluator
            .evaluate(config, &scenario)
            .map(ImpactReport::Single),
        Scenarios::Batch(items) => {
            evaluate_batch(evaluator, config, items).map(ImpactReport::Batch)
        }
    }
}

pub(crate) fn evaluate_batch(
    evaluator: &ImpactEvaluator,
    config: &CanonicalComponentConfig,
    items: Vec<Result<UsageScenario, ValidationError>>,
) -> Result<Vec<ScenarioOutcome>, EvaluationError> {
    let mut outcomes: Vec<ScenarioOutcome> = items
        .into_par_iter()
        .map(|item| -> ScenarioOutcome {
            let scenario = item?;
            evaluator.evaluate(config, &scenario)
        })
        .collect();

    if let Some(index) = outcomes.iter().position(|outcome| {
        matches!(outcome, Err(EvaluationError::CoefficientSourceUnavailable(_)))
    }) {
        if let Err(err) = outcomes.swap_remove(index) {
            return Err(err);
        }
    }

    Ok(outcomes)
}
