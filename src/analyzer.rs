use indexmap::IndexMap;
use serde_json::Number;
use tracing::debug;

use crate::domain::{ChartAverages, ChartData, ChartSeries, EquipmentRecord, Summary};
use crate::error::ServiceError;
use crate::validator::{csv_reader, locate_columns, parse_numeric};

#[derive(Debug, Clone, Copy)]
struct ColumnStats {
    sum: f64,
    min: f64,
    max: f64,
    integral: bool,
}

impl ColumnStats {
    fn new() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            integral: true,
        }
    }

    fn push(&mut self, cell: &str, value: f64) {
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.integral &= cell.parse::<i64>().is_ok();
    }
}

struct RawRow {
    equipment_name: String,
    equipment_type: String,
    cells: [(String, f64); 3],
}

fn analysis_error(message: impl Into<String>) -> ServiceError {
    ServiceError::Analysis {
        message: message.into(),
    }
}

fn to_number(cell: &str, value: f64, integral: bool) -> Result<Number, ServiceError> {
    if integral {
        if let Ok(int) = cell.parse::<i64>() {
            return Ok(Number::from(int));
        }
    }
    Number::from_f64(value).ok_or_else(|| analysis_error(format!("non-finite value '{}'", cell)))
}

/// Computes the summary and the storable rows of an already validated CSV.
pub fn analyze_csv(input: &[u8]) -> Result<(Summary, Vec<EquipmentRecord>), ServiceError> {
    let mut reader = csv_reader(input);
    let headers = reader
        .headers()
        .map_err(|e| analysis_error(e.to_string()))?
        .clone();
    let positions = locate_columns(&headers).map_err(|e| analysis_error(e.to_string()))?;

    let mut stats = [ColumnStats::new(); 3];
    let mut type_counts: IndexMap<String, u64> = IndexMap::new();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| analysis_error(e.to_string()))?;
        let field = |index: usize| record.get(index).unwrap_or("").to_string();

        let mut cells: [(String, f64); 3] = Default::default();
        for (slot, (column, index)) in positions.numeric().into_iter().enumerate() {
            let cell = field(index);
            let value = parse_numeric(&cell)
                .ok_or_else(|| analysis_error(format!("column '{}' is not numeric", column)))?;
            stats[slot].push(&cell, value);
            cells[slot] = (cell, value);
        }

        let equipment_type = field(positions.equipment_type);
        *type_counts.entry(equipment_type.clone()).or_insert(0) += 1;

        rows.push(RawRow {
            equipment_name: field(positions.equipment_name),
            equipment_type,
            cells,
        });
    }

    if rows.is_empty() {
        return Err(analysis_error("file contains no data rows"));
    }

    type_counts.sort_by(|_, a, _, b| b.cmp(a));

    let count = rows.len() as f64;
    let [flowrate, pressure, temperature] = stats;
    let summary = Summary {
        total_equipment: Some(rows.len() as u64),
        average_flowrate: Some(flowrate.sum / count),
        average_pressure: Some(pressure.sum / count),
        average_temperature: Some(temperature.sum / count),
        type_distribution: Some(type_counts),
        min_flowrate: Some(flowrate.min),
        max_flowrate: Some(flowrate.max),
        min_pressure: Some(pressure.min),
        max_pressure: Some(pressure.max),
        min_temperature: Some(temperature.min),
        max_temperature: Some(temperature.max),
    };

    let records = rows
        .into_iter()
        .map(|row| {
            let [(f_cell, f), (p_cell, p), (t_cell, t)] = row.cells;
            Ok(EquipmentRecord {
                equipment_name: row.equipment_name,
                equipment_type: row.equipment_type,
                flowrate: to_number(&f_cell, f, flowrate.integral)?,
                pressure: to_number(&p_cell, p, pressure.integral)?,
                temperature: to_number(&t_cell, t, temperature.integral)?,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    debug!(
        "Analyzed {} rows across {} equipment types",
        records.len(),
        summary.type_distribution.as_ref().map_or(0, |d| d.len())
    );

    Ok((summary, records))
}

/// Chart-ready projection of a summary.
pub fn chart_data(summary: &Summary) -> ChartData {
    let (labels, values): (Vec<String>, Vec<u64>) = summary
        .type_distribution
        .as_ref()
        .map(|dist| {
            dist.iter()
                .map(|(label, count)| (label.clone(), *count))
                .unzip()
        })
        .unwrap_or_default();

    ChartData {
        type_distribution: ChartSeries { labels, values },
        averages: ChartAverages {
            flowrate: summary.average_flowrate,
            pressure: summary.average_pressure,
            temperature: summary.average_temperature,
        },
    }
}
