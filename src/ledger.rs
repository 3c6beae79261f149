use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseItem {
    pub label: String,
    pub amount: f64,
}

impl ExpenseItem {
    pub fn new(label: impl Into<String>, amount: f64) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }
}

/// Ordered list of monthly fixed costs. Edits happen before a run; a run works
/// on the frozen copy returned by [`ExpenseLedger::snapshot`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExpenseLedger {
    items: Vec<ExpenseItem>,
}

impl ExpenseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<ExpenseItem>) -> PlannerResult<Self> {
        let mut ledger = Self::new();
        for item in items {
            ledger.add(item)?;
        }
        Ok(ledger)
    }

    pub fn add(&mut self, item: ExpenseItem) -> PlannerResult<()> {
        validate_item(&item)?;
        self.items.push(item);
        Ok(())
    }

    /// Appends a zero-amount row named after its position.
    pub fn add_placeholder(&mut self) -> &ExpenseItem {
        let label = format!("Expense {}", self.items.len() + 1);
        self.items.push(ExpenseItem::new(label, 0.0));
        &self.items[self.items.len() - 1]
    }

    pub fn remove_at(&mut self, index: usize) -> PlannerResult<ExpenseItem> {
        if index >= self.items.len() {
            return Err(PlannerError::LedgerIndex {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    pub fn update(&mut self, index: usize, item: ExpenseItem) -> PlannerResult<()> {
        validate_item(&item)?;
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or(PlannerError::LedgerIndex { index, len })?;
        *slot = item;
        Ok(())
    }

    pub fn items(&self) -> &[ExpenseItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn monthly_total(&self) -> f64 {
        self.items.iter().map(|item| item.amount).sum()
    }

    pub fn snapshot(&self) -> Vec<ExpenseItem> {
        self.items.clone()
    }
}

fn validate_item(item: &ExpenseItem) -> PlannerResult<()> {
    if !item.amount.is_finite() || item.amount < 0.0 {
        return Err(PlannerError::invalid(format!(
            "expense '{}' must have a non-negative amount, got {}",
            item.label, item.amount
        )));
    }
    Ok(())
}
