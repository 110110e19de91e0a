//! Physical unit families carried by profiles.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a blood-glucose value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BgUnit {
    #[serde(rename = "mmol/L")]
    #[default]
    MmolL,
    #[serde(rename = "mg/dL")]
    MgDl,
}

impl BgUnit {
    pub const MGDL_PER_MMOL: f64 = 18.0;

    /// Express a value given in mmol/L in this unit.
    #[must_use]
    pub fn from_mmol(self, mmol: f64) -> f64 {
        match self {
            Self::MmolL => mmol,
            Self::MgDl => mmol * Self::MGDL_PER_MMOL,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MmolL => "mmol/L",
            Self::MgDl => "mg/dL",
        }
    }
}

impl fmt::Display for BgUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit family of a profile. Every value of one profile shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Insulin rate (basal, TBR, bolus delivery, net)
    UnitsPerHour,
    /// Insulin amount (IOB)
    Units,
    /// Glucose concentration (BG, targets)
    Glucose(BgUnit),
    /// Insulin sensitivity
    GlucosePerUnit(BgUnit),
    /// Carb sensitivity
    GramsPerUnit,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnitsPerHour => f.write_str("U/h"),
            Self::Units => f.write_str("U"),
            Self::Glucose(bg) => write!(f, "{bg}"),
            Self::GlucosePerUnit(bg) => write!(f, "{bg}/U"),
            Self::GramsPerUnit => f.write_str("g/U"),
        }
    }
}
