use std::fmt::{Display, Formatter};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PlannerError, PlannerResult};
use crate::output::{format_currency, format_rate};

pub const STANDARD_DEAL_VALUES: [f64; 5] =
    [500_000.0, 1_000_000.0, 1_500_000.0, 2_000_000.0, 2_500_000.0];

pub const STANDARD_COMMISSION_RATES: [f64; 5] = [0.05, 0.07, 0.11, 0.13, 0.17];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DealType {
    pub value: f64,
    pub rate: f64,
}

impl DealType {
    pub fn new(value: f64, rate: f64) -> Self {
        Self { value, rate }
    }

    pub fn commission(&self) -> f64 {
        self.value * self.rate
    }

    /// Both the value and the rate come from the standard price lists.
    pub fn is_standard(&self) -> bool {
        STANDARD_DEAL_VALUES.contains(&self.value) && STANDARD_COMMISSION_RATES.contains(&self.rate)
    }

    /// "2 × $500,000 @ 11%"
    pub fn describe(&self, count: u32) -> String {
        format!("{count} × {self}")
    }
}

impl Display for DealType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {}",
            format_currency(self.value, 0),
            format_rate(self.rate)
        )
    }
}

/// Deal values in configured order, each with the commission rates it may be sold at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawCatalog")]
pub struct DealCatalog {
    entries: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct RawCatalog {
    entries: Vec<CatalogEntry>,
}

impl TryFrom<RawCatalog> for DealCatalog {
    type Error = PlannerError;

    fn try_from(raw: RawCatalog) -> PlannerResult<Self> {
        Self::from_entries(raw.entries)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub value: f64,
    pub rates: Vec<f64>,
}

impl DealCatalog {
    /// Every value may be sold at every rate.
    pub fn product(values: &[f64], rates: &[f64]) -> PlannerResult<Self> {
        if values.is_empty() {
            return Err(PlannerError::invalid("deal value catalog is empty"));
        }
        if rates.is_empty() {
            return Err(PlannerError::invalid("commission rate catalog is empty"));
        }
        let entries = values
            .iter()
            .map(|value| CatalogEntry {
                value: *value,
                rates: rates.to_vec(),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn from_rate_map(map: Vec<(f64, Vec<f64>)>) -> PlannerResult<Self> {
        if map.is_empty() {
            return Err(PlannerError::invalid("deal rate map is empty"));
        }
        let entries = map
            .into_iter()
            .map(|(value, rates)| CatalogEntry { value, rates })
            .collect();
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<CatalogEntry>) -> PlannerResult<Self> {
        if entries.is_empty() {
            return Err(PlannerError::invalid("deal catalog is empty"));
        }
        for entry in &entries {
            if !entry.value.is_finite() || entry.value <= 0.0 {
                return Err(PlannerError::invalid(format!(
                    "deal value must be positive, got {}",
                    entry.value
                )));
            }
            if entry.rates.is_empty() {
                return Err(PlannerError::invalid(format!(
                    "deal value {} has no commission rates",
                    entry.value
                )));
            }
            if let Some(rate) = entry
                .rates
                .iter()
                .find(|r| !r.is_finite() || **r < 0.0 || **r > 1.0)
            {
                return Err(PlannerError::invalid(format!(
                    "commission rate must be within [0, 1], got {rate}"
                )));
            }
        }
        let catalog = Self { entries };
        for deal in catalog.deal_types().iter().filter(|d| !d.is_standard()) {
            warn!(deal = %deal, "deal type is outside the standard price lists");
        }
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// All sellable deal types, value order first, then rate order.
    pub fn deal_types(&self) -> Vec<DealType> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry
                    .rates
                    .iter()
                    .map(move |rate| DealType::new(entry.value, *rate))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.rates.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uniform value, then a uniform rate among those allowed for it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DealType {
        let entry = &self.entries[rng.gen_range(0..self.entries.len())];
        let rate = entry.rates[rng.gen_range(0..entry.rates.len())];
        DealType::new(entry.value, rate)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::{DealCatalog, DealType};

    #[test]
    fn product_lists_value_major_order() {
        let catalog = DealCatalog::product(&[500_000.0, 1_500_000.0], &[0.05, 0.11]).unwrap();
        let types = catalog.deal_types();
        assert_eq!(types.len(), 4);
        assert_eq!(types[0], DealType::new(500_000.0, 0.05));
        assert_eq!(types[1], DealType::new(500_000.0, 0.11));
        assert_eq!(types[3], DealType::new(1_500_000.0, 0.11));
    }

    #[test]
    fn rate_map_restricts_rates_per_value() {
        let catalog = DealCatalog::from_rate_map(vec![
            (500_000.0, vec![0.05]),
            (2_500_000.0, vec![0.13, 0.17]),
        ])
        .unwrap();
        assert_eq!(catalog.len(), 3);
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..200 {
            let deal = catalog.sample(&mut rng);
            if deal.value == 500_000.0 {
                assert_eq!(deal.rate, 0.05);
            } else {
                assert!(deal.rate == 0.13 || deal.rate == 0.17);
            }
        }
    }

    #[test]
    fn rejects_empty_and_out_of_range_catalogs() {
        assert!(DealCatalog::product(&[], &[0.05]).is_err());
        assert!(DealCatalog::product(&[500_000.0], &[]).is_err());
        assert!(DealCatalog::product(&[0.0], &[0.05]).is_err());
        assert!(DealCatalog::product(&[500_000.0], &[1.5]).is_err());
        assert!(DealCatalog::from_rate_map(vec![(500_000.0, vec![])]).is_err());
    }

    #[test]
    fn deserializing_runs_the_same_validation() {
        let catalog = DealCatalog::product(&[500_000.0], &[0.05, 0.11]).unwrap();
        let json = serde_json::to_string(&catalog).unwrap();
        let back: DealCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, catalog);

        let empty_rates = r#"{"entries":[{"value":500000.0,"rates":[]}]}"#;
        assert!(serde_json::from_str::<DealCatalog>(empty_rates).is_err());
        let bad_rate = r#"{"entries":[{"value":500000.0,"rates":[2.0]}]}"#;
        assert!(serde_json::from_str::<DealCatalog>(bad_rate).is_err());
    }

    #[test]
    fn flags_deal_types_off_the_standard_lists() {
        assert!(DealType::new(1_000_000.0, 0.07).is_standard());
        assert!(!DealType::new(750_000.0, 0.07).is_standard());
        assert!(!DealType::new(500_000.0, 0.125).is_standard());
        // accepted all the same
        assert!(DealCatalog::product(&[750_000.0], &[0.125]).is_ok());
    }

    #[test]
    fn describes_deals_for_reports() {
        let deal = DealType::new(500_000.0, 0.11);
        assert_eq!(deal.describe(2), "2 × $500,000 @ 11%");
        assert!((deal.commission() - 55_000.0).abs() < 1e-6);
    }
}
