pub mod csv;
pub mod json;
pub mod table;

use serde::{Deserialize, Serialize};

use crate::ledger::ExpenseItem;
use crate::plan::ScenarioResult;
use crate::strategy::constraint::SolvedPlan;
use crate::strategy::exhaustive::MonthChoice;

/// Display/export form of a result: one row per month or per scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultTable {
    fn new(title: &str, columns: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// "$1,500,000" with `decimals` fraction digits.
pub fn format_currency(amount: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, amount.abs());
    let (whole, fraction) = match formatted.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (formatted, None),
    };
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && formatted_nonzero(&grouped, fraction.as_deref()) {
        "-"
    } else {
        ""
    };
    match fraction {
        Some(f) => format!("{sign}${grouped}.{f}"),
        None => format!("{sign}${grouped}"),
    }
}

fn formatted_nonzero(whole: &str, fraction: Option<&str>) -> bool {
    whole.chars().chain(fraction.unwrap_or("").chars()).any(|c| ('1'..='9').contains(&c))
}

/// "11%", or "12.5%" when the rate is not a whole percent.
pub fn format_rate(rate: f64) -> String {
    let percent = rate * 100.0;
    if (percent - percent.round()).abs() < 1e-9 {
        format!("{:.0}%", percent.round())
    } else {
        let trimmed = format!("{percent:.2}");
        format!("{}%", trimmed.trim_end_matches('0').trim_end_matches('.'))
    }
}

pub fn format_money(amount: f64) -> String {
    format!("{amount:.2}")
}

pub fn exhaustive_table(months: &[MonthChoice]) -> ResultTable {
    let mut table = ResultTable::new(
        "Monthly Forecast Plan",
        &[
            "month",
            "coaching_clients",
            "deal_count",
            "deal_value",
            "commission_rate",
            "deals",
            "coaching_revenue",
            "deal_revenue",
            "total_revenue",
            "net",
        ],
    );
    for choice in months {
        let deals = if choice.deal_count == 0 {
            "-".to_string()
        } else {
            choice.deal.describe(choice.deal_count)
        };
        table.rows.push(vec![
            (choice.month + 1).to_string(),
            choice.coaching.to_string(),
            choice.deal_count.to_string(),
            format_money(choice.deal.value),
            format!("{}", choice.deal.rate),
            deals,
            format_money(choice.coaching_revenue),
            format_money(choice.deal_revenue),
            format_money(choice.total_revenue),
            format_money(choice.net),
        ]);
    }
    table
}

pub fn sampling_table(scenarios: &[ScenarioResult]) -> ResultTable {
    let mut table = ResultTable::new(
        "Sampled Forecast Scenarios",
        &[
            "rank",
            "coaching_by_month",
            "deals_by_month",
            "total_revenue",
            "total_expense",
            "net_profit",
            "workload",
        ],
    );
    for (idx, scenario) in scenarios.iter().enumerate() {
        let coaching = scenario
            .plan
            .months
            .iter()
            .map(|m| m.coaching.to_string())
            .collect::<Vec<_>>()
            .join("/");
        let deals = scenario
            .plan
            .months
            .iter()
            .map(|m| format!("M{}: {}", m.month + 1, m.describe_deals()))
            .collect::<Vec<_>>()
            .join("; ");
        table.rows.push(vec![
            (idx + 1).to_string(),
            coaching,
            deals,
            format_money(scenario.total_revenue),
            format_money(scenario.total_expense),
            format_money(scenario.net_profit),
            scenario.workload_score.to_string(),
        ]);
    }
    table
}

pub fn constraint_table(solved: &SolvedPlan) -> ResultTable {
    let mut table = ResultTable::new(
        "Constrained Forecast Plan",
        &[
            "month",
            "coaching_clients",
            "deal_count",
            "deals",
            "coaching_revenue",
            "deal_revenue",
            "total_revenue",
        ],
    );
    for month in &solved.months {
        let deals = if month.deals.is_empty() {
            "-".to_string()
        } else {
            month
                .deals
                .iter()
                .map(|line| line.describe())
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.rows.push(vec![
            (month.month + 1).to_string(),
            month.coaching.to_string(),
            month.deals.iter().map(|l| l.count).sum::<u32>().to_string(),
            deals,
            format_money(month.coaching_revenue as f64),
            format_money(month.deal_revenue as f64),
            format_money(month.total_revenue as f64),
        ]);
    }
    table
}

pub fn ledger_table(items: &[ExpenseItem]) -> ResultTable {
    let mut table = ResultTable::new("Monthly Expenses", &["index", "label", "amount"]);
    for (idx, item) in items.iter().enumerate() {
        table.rows.push(vec![
            idx.to_string(),
            item.label.clone(),
            format_money(item.amount),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::{exhaustive_table, format_currency, format_rate};
    use crate::catalog::DealType;
    use crate::strategy::exhaustive::MonthChoice;

    #[test]
    fn groups_thousands() {
        assert_eq!(format_currency(500_000.0, 0), "$500,000");
        assert_eq!(format_currency(2_500_000.0, 0), "$2,500,000");
        assert_eq!(format_currency(13_050.0, 2), "$13,050.00");
        assert_eq!(format_currency(-1234.5, 2), "-$1,234.50");
        assert_eq!(format_currency(999.0, 0), "$999");
        assert_eq!(format_currency(-0.001, 2), "$0.00");
    }

    #[test]
    fn formats_rates_as_percent() {
        assert_eq!(format_rate(0.11), "11%");
        assert_eq!(format_rate(0.07), "7%");
        assert_eq!(format_rate(0.125), "12.5%");
    }

    #[test]
    fn exhaustive_rows_are_one_based_with_two_decimals() {
        let table = exhaustive_table(&[MonthChoice {
            month: 0,
            coaching: 1,
            deal_count: 2,
            deal: DealType::new(500_000.0, 0.11),
            coaching_revenue: 8750.0,
            deal_revenue: 1.0 / 3.0,
            total_revenue: 8750.0 + 1.0 / 3.0,
            net: 8750.0 + 1.0 / 3.0,
        }]);
        let row = &table.rows[0];
        assert_eq!(row[0], "1");
        assert_eq!(row[table.column("deals").unwrap()], "2 × $500,000 @ 11%");
        assert_eq!(row[table.column("deal_revenue").unwrap()], "0.33");
        assert_eq!(row[table.column("net").unwrap()], "8750.33");
    }
}
