use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::output::ResultTable;

pub const DEFAULT_EXPORT_FILE: &str = "forecast_plan.csv";

pub fn to_csv(table: &ResultTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8(data)?)
}

pub fn parse_csv(data: &str) -> Result<ResultTable> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let columns = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(|f| f.to_string()).collect());
    }
    Ok(ResultTable {
        title: String::new(),
        columns,
        rows,
    })
}

pub fn write_csv(path: &Path, table: &ResultTable) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating export directory: {}", parent.display()))?;
    }
    fs::write(path, to_csv(table)?)
        .with_context(|| format!("failed writing CSV export: {}", path.display()))
}
