use log::debug;

use crate::error::SourceError;
use crate::warehouse::energy::GenerationRow;

use super::{parse_decimal, parse_year};

const YEAR_COLUMN: &str = "Years";
const TOTAL_COLUMN: &str = "Grand Total";

/// Power generation by fuel in GWh, one row per year and one column per fuel:
/// `Years, Biomass, Coal, ..., Grand Total`.  Returns one row per (year,
/// fuel) cell.  Empty cells give a null value, the total column is ignored.
pub fn read_generation(content: &str) -> Result<Vec<GenerationRow>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = rdr.headers()?.clone();
    let year_idx = headers
        .iter()
        .position(|h| h == YEAR_COLUMN)
        .ok_or_else(|| SourceError::BadValue {
            field: "header",
            value: headers.iter().collect::<Vec<_>>().join(","),
        })?;
    let fuels: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != year_idx && *h != TOTAL_COLUMN && !h.is_empty())
        .collect();
    debug!("fuel columns: {:?}", fuels);

    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let year = record.get(year_idx).unwrap_or_default();
        if year.is_empty() {
            continue;
        }
        let year = parse_year(year)?;
        for (i, fuel) in &fuels {
            out.push(GenerationRow {
                year,
                fuel: fuel.to_string(),
                gwh: parse_decimal("gwh", record.get(*i).unwrap_or_default())?,
            });
        }
    }
    Ok(out)
}
