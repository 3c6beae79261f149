use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PlannerError, PlannerResult};
use crate::inputs::PlanningInputs;
use crate::plan::{ForecastPlan, MonthlyPlan, ScenarioResult};
use crate::recognition::{recognize, RecognitionPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SamplingSettings {
    pub batch_size: usize,
    pub batches: usize,
    /// Plans at or above this net profit are kept, even when short of the full target.
    pub near_target: f64,
    pub top: usize,
    pub parallel: bool,
    pub policy: RecognitionPolicy,
}

impl SamplingSettings {
    pub fn validate(&self) -> PlannerResult<()> {
        if self.batch_size == 0 || self.batches == 0 {
            return Err(PlannerError::invalid(
                "sampling needs a non-zero batch size and batch count",
            ));
        }
        if self.top == 0 {
            return Err(PlannerError::invalid("sampling top slice must be non-zero"));
        }
        if !self.near_target.is_finite() {
            return Err(PlannerError::invalid("near-target threshold must be finite"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SamplingOutcome {
    Found {
        scenarios: Vec<ScenarioResult>,
        accepted: usize,
        sampled: usize,
    },
    /// Nothing cleared the threshold. This is not a proof that no plan exists.
    Empty { sampled: usize, near_target: f64 },
}

/// Random coaching and deal counts per month, deal types drawn from the catalog.
pub fn sample_plan<R: Rng + ?Sized>(inputs: &PlanningInputs, rng: &mut R) -> ForecastPlan {
    let months = (0..inputs.horizon)
        .map(|month| {
            let mut plan = MonthlyPlan::new(month, inputs.coaching.sample(rng));
            let deal_count = inputs.deals.sample(rng);
            for _ in 0..deal_count {
                plan.add_deals(inputs.catalog.sample(rng), 1);
            }
            plan
        })
        .collect();
    ForecastPlan { months }
}

pub fn score_plan(
    inputs: &PlanningInputs,
    plan: ForecastPlan,
    policy: RecognitionPolicy,
) -> ScenarioResult {
    let mut revenue = vec![0.0; inputs.horizon];
    for month in &plan.months {
        if let Some(slot) = revenue.get_mut(month.month) {
            *slot += f64::from(month.coaching) * inputs.coaching_price;
        }
        for line in &month.deals {
            let schedule = recognize(&line.deal, line.count, month.month, inputs.horizon, policy);
            for (slot, amount) in revenue.iter_mut().zip(schedule) {
                *slot += amount;
            }
        }
    }
    ScenarioResult::new(plan, revenue, inputs.total_expense())
}

fn run_batch(
    inputs: &PlanningInputs,
    settings: &SamplingSettings,
    batch: usize,
    seed: u64,
) -> Vec<ScenarioResult> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let accepted: Vec<ScenarioResult> = (0..settings.batch_size)
        .map(|_| score_plan(inputs, sample_plan(inputs, &mut rng), settings.policy))
        .filter(|result| result.net_profit >= settings.near_target)
        .collect();
    debug!(
        batch = batch + 1,
        of = settings.batches,
        accepted = accepted.len(),
        "sampling batch complete"
    );
    accepted
}

/// Monte-Carlo search over whole-horizon plans. Each batch draws from its own
/// generator seeded by `rng`, so a seeded run gives the same result with or
/// without `parallel`.
pub fn run_sampling<R: Rng + ?Sized>(
    inputs: &PlanningInputs,
    settings: &SamplingSettings,
    rng: &mut R,
) -> PlannerResult<SamplingOutcome> {
    settings.validate()?;
    info!(
        batches = settings.batches,
        batch_size = settings.batch_size,
        near_target = settings.near_target,
        parallel = settings.parallel,
        "running sampled forecast search"
    );

    let seeds: Vec<u64> = (0..settings.batches).map(|_| rng.gen()).collect();
    let batches: Vec<Vec<ScenarioResult>> = if settings.parallel {
        seeds
            .par_iter()
            .enumerate()
            .map(|(batch, seed)| run_batch(inputs, settings, batch, *seed))
            .collect()
    } else {
        seeds
            .iter()
            .enumerate()
            .map(|(batch, seed)| run_batch(inputs, settings, batch, *seed))
            .collect()
    };

    let sampled = settings.batches * settings.batch_size;
    let mut scenarios: Vec<ScenarioResult> = batches.into_iter().flatten().collect();
    let accepted = scenarios.len();
    if scenarios.is_empty() {
        warn!(sampled, "no sampled plan cleared the near-target threshold");
        return Ok(SamplingOutcome::Empty {
            sampled,
            near_target: settings.near_target,
        });
    }

    scenarios.sort_by(|a, b| b.net_profit.total_cmp(&a.net_profit));
    scenarios.truncate(settings.top);
    info!(accepted, kept = scenarios.len(), "sampling finished");
    Ok(SamplingOutcome::Found {
        scenarios,
        accepted,
        sampled,
    })
}
