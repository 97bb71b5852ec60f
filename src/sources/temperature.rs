use csv::StringRecord;

use crate::error::SourceError;
use crate::warehouse::energy::TemperatureRow;

use super::{parse_decimal, parse_year};

/// Yearly mean temperature, a CSV with a header row and the columns
/// `year, avg_mean_temp_deg_c`.
pub fn read_temperatures(content: &str) -> Result<Vec<TemperatureRow>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut out = Vec::new();
    for record in rdr.records() {
        let record: StringRecord = record?;
        let year = record.get(0).unwrap_or_default();
        if year.is_empty() {
            continue;
        }
        out.push(TemperatureRow {
            year: parse_year(year)?,
            avg_mean_temp_deg_c: parse_decimal(
                "avg_mean_temp_deg_c",
                record.get(1).unwrap_or_default(),
            )?,
        });
    }
    Ok(out)
}
