use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Row, Table};

use crate::output::ResultTable;

const NUMERIC_COLUMNS: [&str; 9] = [
    "coaching_revenue",
    "deal_revenue",
    "total_revenue",
    "total_expense",
    "net",
    "net_profit",
    "deal_value",
    "amount",
    "workload",
];

pub fn render_table(result: &ResultTable) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(result.columns.iter().map(|c| header_label(c)).collect::<Vec<_>>());

    for row in &result.rows {
        let cells = row.iter().zip(&result.columns).map(|(value, column)| {
            let mut cell = Cell::new(value);
            if NUMERIC_COLUMNS.contains(&column.as_str()) {
                cell = cell.set_alignment(CellAlignment::Right);
            }
            if (column == "net" || column == "net_profit") && value.starts_with('-') {
                cell = cell.fg(Color::Red);
            }
            cell
        });
        table.add_row(Row::from(cells.collect::<Vec<_>>()));
    }

    let mut out = String::new();
    if !result.title.is_empty() {
        out.push_str(&result.title);
        out.push('\n');
    }
    out.push_str(&table.to_string());
    out
}

/// "coaching_revenue" -> "Coaching Revenue"
fn header_label(column: &str) -> String {
    column
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
