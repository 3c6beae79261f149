use serde::{Deserialize, Serialize};

use crate::catalog::DealType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DealLine {
    pub deal: DealType,
    pub count: u32,
}

impl DealLine {
    pub fn describe(&self) -> String {
        self.deal.describe(self.count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyPlan {
    /// Zero-based month index within the horizon.
    pub month: usize,
    pub coaching: u32,
    pub deals: Vec<DealLine>,
}

impl MonthlyPlan {
    pub fn new(month: usize, coaching: u32) -> Self {
        Self {
            month,
            coaching,
            deals: Vec::new(),
        }
    }

    /// Adds `count` deals of `deal`, merging with an existing line of the same type.
    pub fn add_deals(&mut self, deal: DealType, count: u32) {
        if count == 0 {
            return;
        }
        match self.deals.iter_mut().find(|line| line.deal == deal) {
            Some(line) => line.count += count,
            None => self.deals.push(DealLine { deal, count }),
        }
    }

    pub fn deal_count(&self) -> u32 {
        self.deals.iter().map(|line| line.count).sum()
    }

    pub fn workload(&self) -> u32 {
        self.coaching + self.deal_count()
    }

    pub fn describe_deals(&self) -> String {
        if self.deals.is_empty() {
            return "-".to_string();
        }
        self.deals
            .iter()
            .map(DealLine::describe)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForecastPlan {
    pub months: Vec<MonthlyPlan>,
}

impl ForecastPlan {
    pub fn horizon(&self) -> usize {
        self.months.len()
    }

    pub fn workload(&self) -> u32 {
        self.months.iter().map(MonthlyPlan::workload).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioResult {
    pub plan: ForecastPlan,
    pub monthly_revenue: Vec<f64>,
    pub total_revenue: f64,
    pub total_expense: f64,
    pub net_profit: f64,
    pub workload_score: u32,
}

impl ScenarioResult {
    /// Net profit and workload are always derived, never supplied.
    pub fn new(plan: ForecastPlan, monthly_revenue: Vec<f64>, total_expense: f64) -> Self {
        let total_revenue = monthly_revenue.iter().sum::<f64>();
        let workload_score = plan.workload();
        Self {
            plan,
            monthly_revenue,
            total_revenue,
            total_expense,
            net_profit: total_revenue - total_expense,
            workload_score,
        }
    }
}
