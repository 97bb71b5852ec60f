use std::fmt::{self, Display};

use super::keys::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyCategory {
    GreenEnergy,
    FossilFuels,
    Other,
}

impl Display for EnergyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use EnergyCategory::*;
        match self {
            GreenEnergy => write!(f, "Green Energy"),
            FossilFuels => write!(f, "Fossil Fuels"),
            Other => write!(f, "Other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuelClass {
    pub renewable: bool,
    pub category: EnergyCategory,
}

impl FuelClass {
    /// `Y` or `N`, as stored in `is_renewable`.
    pub fn renewable_flag(&self) -> &'static str {
        if self.renewable {
            "Y"
        } else {
            "N"
        }
    }

    /// Attribute values in the order `is_renewable, energy_categ`.
    pub fn attributes(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.renewable_flag()),
            Scalar::Text(self.category.to_string()),
        ]
    }
}

const RENEWABLE: [&str; 5] = ["hydro", "wind", "solar", "geo", "biomass"];
const FOSSIL: [&str; 3] = ["coal", "oil", "natural gas"];

/// Classify a fuel by case-insensitive substring membership.  Renewable
/// markers are checked first.
pub fn classify_fuel(name: &str) -> FuelClass {
    let low = name.to_lowercase();
    if RENEWABLE.iter().any(|k| low.contains(k)) {
        FuelClass {
            renewable: true,
            category: EnergyCategory::GreenEnergy,
        }
    } else if FOSSIL.iter().any(|k| low.contains(k)) {
        FuelClass {
            renewable: false,
            category: EnergyCategory::FossilFuels,
        }
    } else {
        FuelClass {
            renewable: false,
            category: EnergyCategory::Other,
        }
    }
}
