//! World Bank development indicators: the renewable electricity output XML
//! dump and the electricity production shares from the JSON API.

use std::collections::BTreeMap;

use log::{info, warn};
use quick_xml::de::from_str;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::SourceError;
use crate::warehouse::energy::{EnergyMixRow, RenewableOutputRow};

use super::{parse_decimal, parse_year};

pub const API_URL: &str = "https://api.worldbank.org/v2";

pub const COAL: &str = "EG.ELC.COAL.ZS";
pub const HYDRO: &str = "EG.ELC.HYRO.ZS";
pub const NATURAL_GAS: &str = "EG.ELC.NGAS.ZS";
pub const NUCLEAR: &str = "EG.ELC.NUCL.ZS";
pub const OIL: &str = "EG.ELC.PETR.ZS";
pub const RENEWABLE: &str = "EG.ELC.RNEW.ZS";

/// Electricity production by source, % of total.
pub const MIX_INDICATORS: [&str; 6] = [COAL, HYDRO, NATURAL_GAS, NUCLEAR, OIL, RENEWABLE];

const PER_PAGE: u32 = 1000;

#[derive(Debug, Deserialize)]
struct Root {
    data: Data,
}

#[derive(Debug, Deserialize)]
struct Data {
    #[serde(rename = "record", default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "field", default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Field {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@key", default)]
    key: Option<String>,
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

/// Read the `API_EG.ELC.RNEW.ZS_DS2_en_xml` dump.  Every record holds the
/// fields `Country or Area` (code in the key attribute), `Item`, `Year` and
/// `Value`.
pub fn read_renewable_output(content: &str) -> Result<Vec<RenewableOutputRow>, SourceError> {
    let root: Root = from_str(content)?;
    let mut out = Vec::with_capacity(root.data.records.len());
    for record in root.data.records {
        let mut row = RenewableOutputRow {
            country_code: None,
            country_name: None,
            year: 0,
            value: None,
        };
        let mut year = None;
        for field in record.fields {
            match field.name.as_str() {
                "Country or Area" => {
                    row.country_code = field.key;
                    row.country_name = field.value;
                }
                "Year" => year = field.value,
                "Value" => {
                    row.value = match &field.value {
                        Some(v) => parse_decimal("renew_out_pct", v)?,
                        None => None,
                    }
                }
                _ => {}
            }
        }
        match year {
            Some(y) => {
                row.year = parse_year(&y)?;
                out.push(row);
            }
            None => warn!("renewable output record without a year, skipping"),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdValue {
    pub id: String,
    pub value: String,
}

/// One observation of an indicator for a country and year.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorRecord {
    pub indicator: IdValue,
    pub country: IdValue,
    pub date: String,
    pub value: Option<Decimal>,
}

/// Parse one page of the indicator API, `[meta, [records...]]`.  An error
/// page (a single element array) or an empty page gives no records.
pub fn parse_page(content: &str) -> Result<Option<(PageMeta, Vec<IndicatorRecord>)>, SourceError> {
    let page: Vec<serde_json::Value> = serde_json::from_str(content)?;
    if page.len() < 2 {
        return Ok(None);
    }
    let meta: PageMeta = serde_json::from_value(page[0].clone())?;
    let records: Option<Vec<IndicatorRecord>> = serde_json::from_value(page[1].clone())?;
    Ok(Some((meta, records.unwrap_or_default())))
}

/// Fetch all pages of an indicator for all countries.
pub fn fetch_indicator(
    client: &reqwest::blocking::Client,
    base_url: &str,
    indicator: &str,
) -> Result<Vec<IndicatorRecord>, SourceError> {
    let mut out = Vec::new();
    let mut page = 1;
    loop {
        let url = format!(
            "{}/country/all/indicator/{}?format=json&per_page={}&page={}",
            base_url, indicator, PER_PAGE, page
        );
        info!("fetching {} page {} ...", indicator, page);
        let text = client.get(url).send()?.error_for_status()?.text()?;
        let Some((meta, records)) = parse_page(&text)? else {
            break;
        };
        if records.is_empty() {
            break;
        }
        out.extend(records);
        if meta.page >= meta.pages {
            break;
        }
        page += 1;
    }
    info!("{}: {} records", indicator, out.len());
    Ok(out)
}

/// One row per (country, year) with every indicator as a fraction of 1.
/// Duplicate observations keep the largest value.
pub fn pivot_energy_mix(records: &[IndicatorRecord]) -> Result<Vec<EnergyMixRow>, SourceError> {
    let hundred = Decimal::ONE_HUNDRED;
    let mut rows: BTreeMap<(String, i32), EnergyMixRow> = BTreeMap::new();
    for r in records {
        let year = parse_year(&r.date)?;
        let row = rows
            .entry((r.country.id.clone(), year))
            .or_insert_with(|| EnergyMixRow {
                country_code: Some(r.country.id.clone()),
                country_name: Some(r.country.value.clone()),
                year,
                ..Default::default()
            });
        let slot = match r.indicator.id.as_str() {
            COAL => &mut row.coal,
            HYDRO => &mut row.hydro,
            NATURAL_GAS => &mut row.natural_gas,
            NUCLEAR => &mut row.nuclear,
            OIL => &mut row.oil,
            RENEWABLE => &mut row.renewable,
            other => {
                warn!("ignoring indicator {}", other);
                continue;
            }
        };
        if let Some(v) = r.value {
            let v = v / hundred;
            *slot = Some(slot.map_or(v, |old| old.max(v)));
        }
    }
    Ok(rows.into_values().collect())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use rust_decimal_macros::dec;

    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Root xmlns:wb="http://www.worldbank.org">
  <data>
    <record>
      <field name="Country or Area" key="PHL">Philippines</field>
      <field name="Item" key="EG.ELC.RNEW.ZS">Renewable electricity output (% of total electricity output)</field>
      <field name="Year">2015</field>
      <field name="Value">25.4529475839</field>
    </record>
    <record>
      <field name="Country or Area" key="ABW">Aruba</field>
      <field name="Item" key="EG.ELC.RNEW.ZS">Renewable electricity output (% of total electricity output)</field>
      <field name="Year">1960</field>
      <field name="Value" />
    </record>
  </data>
</Root>"#;

    #[test]
    fn read_xml_dump() -> Result<(), Box<dyn Error>> {
        let rows = read_renewable_output(XML)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].country_code.as_deref(), Some("PHL"));
        assert_eq!(rows[0].country_name.as_deref(), Some("Philippines"));
        assert_eq!(rows[0].year, 2015);
        assert_eq!(rows[0].value, Some(dec!(25.4529475839)));
        assert_eq!(rows[1].year, 1960);
        assert_eq!(rows[1].value, None);
        Ok(())
    }

    const PAGE: &str = r#"[
  {"page":2,"pages":2,"per_page":1000,"total":1003,"sourceid":"2","lastupdated":"2025-07-01"},
  [
    {"indicator":{"id":"EG.ELC.COAL.ZS","value":"Electricity production from coal sources (% of total)"},
     "country":{"id":"PH","value":"Philippines"},"countryiso3code":"PHL","date":"2015",
     "value":44.9,"unit":"","obs_status":"","decimal":1},
    {"indicator":{"id":"EG.ELC.COAL.ZS","value":"Electricity production from coal sources (% of total)"},
     "country":{"id":"PH","value":"Philippines"},"countryiso3code":"PHL","date":"2016",
     "value":null,"unit":"","obs_status":"","decimal":1}
  ]
]"#;

    #[test]
    fn parse_json_page() -> Result<(), Box<dyn Error>> {
        let (meta, records) = parse_page(PAGE)?.ok_or("no page")?;
        assert_eq!((meta.page, meta.pages), (2, 2));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].country.id, "PH");
        assert_eq!(records[0].value, Some(dec!(44.9)));
        assert_eq!(records[1].value, None);

        let error_page = r#"[{"message":[{"id":"120","key":"Invalid value"}]}]"#;
        assert!(parse_page(error_page)?.is_none());
        let empty = r#"[{"page":1,"pages":0,"per_page":1000,"total":0}, null]"#;
        assert_eq!(parse_page(empty)?.ok_or("no page")?.1.len(), 0);
        Ok(())
    }

    fn record(indicator: &str, country: &str, date: &str, value: Option<Decimal>) -> IndicatorRecord {
        IndicatorRecord {
            indicator: IdValue {
                id: indicator.to_string(),
                value: String::new(),
            },
            country: IdValue {
                id: country.to_string(),
                value: format!("{} name", country),
            },
            date: date.to_string(),
            value,
        }
    }

    #[test]
    fn pivot_to_fractions() -> Result<(), Box<dyn Error>> {
        let records = vec![
            record(COAL, "PH", "2015", Some(dec!(44.9))),
            record(HYDRO, "PH", "2015", Some(dec!(10))),
            record(NUCLEAR, "PH", "2015", None),
            record(COAL, "PH", "2016", Some(dec!(47.7))),
            record(COAL, "PH", "2016", Some(dec!(40))),
            record("EG.ELC.FOSL.ZS", "VN", "2015", Some(dec!(60))),
        ];
        let rows = pivot_energy_mix(&records)?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].year, 2015);
        assert_eq!(rows[0].coal, Some(dec!(0.449)));
        assert_eq!(rows[0].hydro, Some(dec!(0.1)));
        assert_eq!(rows[0].nuclear, None);
        assert_eq!(rows[1].coal, Some(dec!(0.477)));
        // unknown indicator: row exists but carries no shares
        assert_eq!(rows[2].country_code.as_deref(), Some("VN"));
        assert_eq!(rows[2].coal, None);
        Ok(())
    }

    #[test]
    #[ignore]
    fn fetch_coal_share() -> Result<(), Box<dyn Error>> {
        let client = reqwest::blocking::Client::new();
        let records = fetch_indicator(&client, API_URL, COAL)?;
        assert!(records.iter().any(|r| r.country.id == "PH"));
        Ok(())
    }
}
