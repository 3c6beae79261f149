use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::DealCatalog;
use crate::error::{PlannerError, PlannerResult};
use crate::inputs::{CountRange, PlanningInputs};
use crate::ledger::{ExpenseItem, ExpenseLedger};
use crate::recognition::RecognitionPolicy;
use crate::solver::branch_bound::DEFAULT_MAX_NODES;
use crate::strategy::constraint::{ConstraintSettings, SolveMode};
use crate::strategy::exhaustive::ExhaustiveSettings;
use crate::strategy::sampling::SamplingSettings;

const APP_DIR: &str = "revenue-planner";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default = "default_coaching_range")]
    pub coaching: RangeConfig,
    #[serde(default)]
    pub deals: DealsConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default = "default_expenses")]
    pub expenses: Vec<ExpenseItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_months")]
    pub months: i64,
    #[serde(default = "default_net_target")]
    pub net_target: f64,
    #[serde(default = "default_coaching_price")]
    pub coaching_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealsConfig {
    #[serde(default)]
    pub min: i64,
    #[serde(default = "default_max_count")]
    pub max: i64,
    #[serde(default = "default_deal_values")]
    pub values: Vec<f64>,
    #[serde(default = "default_commission_rates")]
    pub rates: Vec<f64>,
    /// Deal value (as a string key) to the rates it may be sold at. Replaces
    /// `values` x `rates` when non-empty.
    #[serde(default)]
    pub rate_map: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default = "default_amortized")]
    pub exhaustive: RecognitionPolicy,
    #[serde(default = "default_straight_line")]
    pub sampling: RecognitionPolicy,
    #[serde(default = "default_amortized")]
    pub constraint: RecognitionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batches")]
    pub batches: usize,
    #[serde(default = "default_near_target")]
    pub near_target: f64,
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Defaults to `deals.max`.
    #[serde(default)]
    pub max_deals_per_month: Option<i64>,
    /// Defaults to `coaching.max`.
    #[serde(default)]
    pub max_coaching_per_month: Option<i64>,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub months: Option<i64>,
    pub net_target: Option<f64>,
    pub coaching_price: Option<f64>,
}

impl Config {
    /// `~/.config/revenue-planner/config.toml`, or `config.toml` in the working
    /// directory when there is no home directory.
    pub fn default_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(".config").join(APP_DIR).join(CONFIG_FILE),
            None => PathBuf::from(CONFIG_FILE),
        }
    }

    /// A missing file is not an error: the planner runs on built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no planner config, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("cannot read planner config {}", path.display()));
            }
        };
        toml::from_str(&text)
            .with_context(|| format!("planner config {} is not valid TOML", path.display()))
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(months) = overrides.months {
            self.forecast.months = months;
        }
        if let Some(net_target) = overrides.net_target {
            self.forecast.net_target = net_target;
        }
        if let Some(coaching_price) = overrides.coaching_price {
            self.forecast.coaching_price = coaching_price;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create config directory {}", dir.display()))?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("cannot write planner config template {}", path.display()))?;
        info!(path = %path.display(), "wrote planner config template");
        Ok(())
    }

    pub fn ledger(&self) -> PlannerResult<ExpenseLedger> {
        ExpenseLedger::with_items(self.expenses.clone())
    }

    pub fn catalog(&self) -> PlannerResult<DealCatalog> {
        if self.deals.rate_map.is_empty() {
            return DealCatalog::product(&self.deals.values, &self.deals.rates);
        }
        let mut entries = Vec::with_capacity(self.deals.rate_map.len());
        for (key, rates) in &self.deals.rate_map {
            let value: f64 = key.trim().replace('_', "").parse().map_err(|_| {
                PlannerError::invalid(format!("rate map key '{key}' is not a deal value"))
            })?;
            entries.push((value, rates.clone()));
        }
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        DealCatalog::from_rate_map(entries)
    }

    /// Validates the configuration and freezes it, with `ledger` as the expense snapshot.
    pub fn to_inputs(&self, ledger: &ExpenseLedger) -> PlannerResult<PlanningInputs> {
        PlanningInputs::new(
            self.forecast.months,
            self.forecast.net_target,
            self.forecast.coaching_price,
            CountRange::new("coaching", self.coaching.min, self.coaching.max)?,
            CountRange::new("deal count", self.deals.min, self.deals.max)?,
            self.catalog()?,
            ledger.snapshot(),
        )
    }

    pub fn exhaustive_settings(&self) -> ExhaustiveSettings {
        ExhaustiveSettings {
            policy: self.recognition.exhaustive,
        }
    }

    pub fn sampling_settings(&self) -> PlannerResult<SamplingSettings> {
        let settings = SamplingSettings {
            batch_size: self.sampling.batch_size,
            batches: self.sampling.batches,
            near_target: self.sampling.near_target,
            top: self.sampling.top,
            parallel: self.sampling.parallel,
            policy: self.recognition.sampling,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn constraint_settings(&self, mode: SolveMode) -> PlannerResult<ConstraintSettings> {
        let max_deals = self.solver.max_deals_per_month.unwrap_or(self.deals.max);
        let max_coaching = self
            .solver
            .max_coaching_per_month
            .unwrap_or(self.coaching.max);
        if self.solver.max_nodes == 0 {
            return Err(PlannerError::invalid("solver node budget must be non-zero"));
        }
        let deals = CountRange::new("max deals per month", 0, max_deals)?;
        Ok(ConstraintSettings {
            mode,
            coaching: CountRange::new("coaching per month", self.coaching.min, max_coaching)?,
            max_deals_per_month: deals.max,
            policy: self.recognition.constraint,
        })
    }

    pub fn default_template() -> String {
        let template = r#"[forecast]
months = 6
net_target = 1000000.0
coaching_price = 8750.0

[coaching]
min = 0
max = 3

[deals]
min = 0
max = 3
# Standard values: 500000, 1000000, 1500000, 2000000, 2500000
values = [500000.0, 1500000.0, 2500000.0]
# Standard rates: 0.05, 0.07, 0.11, 0.13, 0.17
rates = [0.05, 0.11, 0.17]

# Restrict the rates each value may be sold at (replaces values x rates):
# [deals.rate_map]
# "500000" = [0.05, 0.07]
# "2500000" = [0.13, 0.17]

[recognition]
# amortized_tail | straight_line_deferred
exhaustive = "amortized_tail"
sampling = "straight_line_deferred"
constraint = "amortized_tail"

[sampling]
batch_size = 1000
batches = 50
near_target = 900000.0
top = 100
parallel = true
# seed = 42

[solver]
# max_deals_per_month = 3
# max_coaching_per_month = 3
max_nodes = 2000000

[[expenses]]
label = "Travel & Expenses"
amount = 6000.0

[[expenses]]
label = "Marketing Costs"
amount = 600.0

[[expenses]]
label = "Marketing Agency"
amount = 3000.0

[[expenses]]
label = "Full-Time VA Salary"
amount = 1200.0

[[expenses]]
label = "Part-Time VA Salary"
amount = 400.0

[[expenses]]
label = "Finance VA Salary"
amount = 400.0

[[expenses]]
label = "AI/Automations"
amount = 250.0

[[expenses]]
label = "Software & SaaS Tools"
amount = 600.0

[[expenses]]
label = "Legal & Compliance Fees"
amount = 300.0

[[expenses]]
label = "Insurance (Liability, E&O, Cyber)"
amount = 300.0
"#;
        template.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            coaching: default_coaching_range(),
            deals: DealsConfig::default(),
            recognition: RecognitionConfig::default(),
            sampling: SamplingConfig::default(),
            solver: SolverConfig::default(),
            expenses: default_expenses(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            months: default_months(),
            net_target: default_net_target(),
            coaching_price: default_coaching_price(),
        }
    }
}

impl Default for DealsConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: default_max_count(),
            values: default_deal_values(),
            rates: default_commission_rates(),
            rate_map: BTreeMap::new(),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            exhaustive: default_amortized(),
            sampling: default_straight_line(),
            constraint: default_amortized(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batches: default_batches(),
            near_target: default_near_target(),
            top: default_top(),
            seed: None,
            parallel: true,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_deals_per_month: None,
            max_coaching_per_month: None,
            max_nodes: default_max_nodes(),
        }
    }
}

fn default_months() -> i64 {
    6
}

fn default_net_target() -> f64 {
    1_000_000.0
}

fn default_coaching_price() -> f64 {
    8_750.0
}

fn default_max_count() -> i64 {
    3
}

fn default_coaching_range() -> RangeConfig {
    RangeConfig {
        min: 0,
        max: default_max_count(),
    }
}

fn default_deal_values() -> Vec<f64> {
    vec![500_000.0, 1_500_000.0, 2_500_000.0]
}

fn default_commission_rates() -> Vec<f64> {
    vec![0.05, 0.11, 0.17]
}

fn default_amortized() -> RecognitionPolicy {
    RecognitionPolicy::AmortizedTail
}

fn default_straight_line() -> RecognitionPolicy {
    RecognitionPolicy::StraightLineDeferred
}

fn default_batch_size() -> usize {
    1_000
}

fn default_batches() -> usize {
    50
}

fn default_near_target() -> f64 {
    900_000.0
}

fn default_top() -> usize {
    100
}

fn default_max_nodes() -> u64 {
    DEFAULT_MAX_NODES
}

fn default_true() -> bool {
    true
}

fn default_expenses() -> Vec<ExpenseItem> {
    [
        ("Travel & Expenses", 6000.0),
        ("Marketing Costs", 600.0),
        ("Marketing Agency", 3000.0),
        ("Full-Time VA Salary", 1200.0),
        ("Part-Time VA Salary", 400.0),
        ("Finance VA Salary", 400.0),
        ("AI/Automations", 250.0),
        ("Software & SaaS Tools", 600.0),
        ("Legal & Compliance Fees", 300.0),
        ("Insurance (Liability, E&O, Cyber)", 300.0),
    ]
    .into_iter()
    .map(|(label, amount)| ExpenseItem::new(label, amount))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigOverrides};
    use crate::error::PlannerError;
    use crate::recognition::RecognitionPolicy;
    use crate::strategy::constraint::SolveMode;

    #[test]
    fn defaults_match_template() {
        let parsed: Config = toml::from_str(&Config::default_template()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.forecast.months, defaults.forecast.months);
        assert_eq!(parsed.deals.values, defaults.deals.values);
        assert_eq!(parsed.expenses, defaults.expenses);
        assert_eq!(parsed.sampling.top, 100);
        assert_eq!(
            parsed.recognition.sampling,
            RecognitionPolicy::StraightLineDeferred
        );
        let ledger = defaults.ledger().unwrap();
        assert_eq!(ledger.len(), 10);
        assert!((ledger.monthly_total() - 13_050.0).abs() < 1e-9);
    }

    #[test]
    fn missing_file_yields_defaults_and_template_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.forecast.net_target, 1_000_000.0);

        Config::write_template(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.expenses.len(), 10);
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[forecast\nmonths = 3").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
        assert!(Config::default_path().ends_with("config.toml"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[forecast]
months = 3

[deals.rate_map]
"2500000" = [0.13, 0.17]
"500_000" = [0.05]
"#,
        )
        .unwrap();
        assert_eq!(parsed.forecast.months, 3);
        assert_eq!(parsed.forecast.coaching_price, 8750.0);
        assert_eq!(parsed.expenses.len(), 10);
        let catalog = parsed.catalog().unwrap();
        assert_eq!(catalog.entries()[0].value, 500_000.0);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn overrides_win() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            months: Some(12),
            net_target: Some(50.0),
            coaching_price: None,
        });
        assert_eq!(config.forecast.months, 12);
        assert_eq!(config.forecast.net_target, 50.0);
        assert_eq!(config.forecast.coaching_price, 8750.0);
    }

    #[test]
    fn invalid_configuration_is_rejected_before_search() {
        let ledger = Config::default().ledger().unwrap();

        let mut config = Config::default();
        config.deals.values.clear();
        assert!(matches!(
            config.to_inputs(&ledger),
            Err(PlannerError::InvalidConfig(_))
        ));

        let mut config = Config::default();
        config.coaching.min = -1;
        assert!(config.to_inputs(&ledger).is_err());

        let mut config = Config::default();
        config.deals.min = 4;
        assert!(config.to_inputs(&ledger).is_err());

        let mut config = Config::default();
        config.forecast.months = 13;
        assert!(config.to_inputs(&ledger).is_err());

        let mut config = Config::default();
        config.sampling.batch_size = 0;
        assert!(config.sampling_settings().is_err());

        let mut config = Config::default();
        config.solver.max_nodes = 0;
        assert!(config.constraint_settings(SolveMode::Feasibility).is_err());

        let mut config = Config::default();
        config.deals.rate_map.insert("lots".to_string(), vec![0.05]);
        assert!(config.catalog().is_err());
    }

    #[test]
    fn solver_caps_default_to_count_ranges() {
        let config = Config::default();
        let settings = config
            .constraint_settings(SolveMode::MinimizeWorkload)
            .unwrap();
        assert_eq!(settings.max_deals_per_month, 3);
        assert_eq!(settings.coaching.max, 3);
        assert_eq!(settings.policy, RecognitionPolicy::AmortizedTail);
    }
}
