use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::inputs::PlanningInputs;

/// Envelope for a run's JSON output: what was asked, and what came back.
#[derive(Debug, Serialize)]
pub struct RunReport<'a, T: Serialize> {
    pub strategy: &'a str,
    pub generated_at: DateTime<Utc>,
    pub inputs: &'a PlanningInputs,
    pub outcome: &'a T,
}

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn render_report<T: Serialize>(
    strategy: &str,
    inputs: &PlanningInputs,
    outcome: &T,
) -> Result<String> {
    render_json(&RunReport {
        strategy,
        generated_at: Utc::now(),
        inputs,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::render_report;
    use crate::inputs::tests::inputs;
    use crate::strategy::exhaustive::{run_exhaustive, ExhaustiveSettings};

    #[test]
    fn report_tags_outcome_and_echoes_inputs() {
        let inputs = inputs(1, 0.0, (0, 1), (0, 1), &[500_000.0], &[0.05], 0.0);
        let outcome = run_exhaustive(&inputs, &ExhaustiveSettings::default());
        let rendered = render_report("exhaustive", &inputs, &outcome).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["strategy"], "exhaustive");
        assert_eq!(value["outcome"]["outcome"], "feasible");
        assert_eq!(value["inputs"]["horizon"], 1);
        assert!(value["generated_at"].is_string());
    }
}
