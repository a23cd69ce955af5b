//! Oil specification records produced by the crawler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fluid category of a specification.
///
/// Stored in the database as the canonical snake_case code; the localized
/// label is a display concern for the catalog API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluidType {
    Engine,
    Transmission,
    Brake,
    Coolant,
    PowerSteering,
    Differential,
}

impl FluidType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engine => "engine",
            Self::Transmission => "transmission",
            Self::Brake => "brake",
            Self::Coolant => "coolant",
            Self::PowerSteering => "power_steering",
            Self::Differential => "differential",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "engine" => Some(Self::Engine),
            "transmission" => Some(Self::Transmission),
            "brake" => Some(Self::Brake),
            "coolant" => Some(Self::Coolant),
            "power_steering" => Some(Self::PowerSteering),
            "differential" => Some(Self::Differential),
            _ => None,
        }
    }

    /// Map an advisor component category code to a fluid type.
    pub fn from_category_code(code: &str) -> Option<Self> {
        match code {
            "ENGINE_OIL" => Some(Self::Engine),
            "TRANSMISSION_OIL" => Some(Self::Transmission),
            "BRAKE_FLUID" => Some(Self::Brake),
            "COOLANT" => Some(Self::Coolant),
            "POWER_STEERING" => Some(Self::PowerSteering),
            "DIFFERENTIAL" => Some(Self::Differential),
            _ => None,
        }
    }

    /// Localized pt-BR label, used by the read-only catalog API.
    pub fn localized_label(&self) -> &'static str {
        match self {
            Self::Engine => "Óleo do Motor",
            Self::Transmission => "Óleo de Transmissão",
            Self::Brake => "Fluido de Freio",
            Self::Coolant => "Líquido de Arrefecimento",
            Self::PowerSteering => "Direção Hidráulica",
            Self::Differential => "Diferencial",
        }
    }
}

/// A normalized oil specification for one vehicle and fluid category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OilSpecification {
    pub id: i32,
    pub vehicle_id: i32,
    pub fluid_type: FluidType,
    pub viscosity: Option<String>,
    pub capacity: Option<String>,
    pub norm: Option<String>,
    pub recommendation: Option<String>,
    pub observation: Option<String>,
    /// Which enrichment source produced this row (currently always "motul").
    pub source: String,
    /// Advisor vehicle-type id the specification was fetched for.
    pub external_type_id: Option<String>,
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a new specification row.
#[derive(Debug, Clone)]
pub struct NewOilSpecification {
    pub vehicle_id: i32,
    pub fluid_type: FluidType,
    pub viscosity: Option<String>,
    pub capacity: Option<String>,
    pub norm: Option<String>,
    pub recommendation: Option<String>,
    pub observation: Option<String>,
    pub source: String,
    pub external_type_id: Option<String>,
    pub confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_code_mapping() {
        assert_eq!(
            FluidType::from_category_code("ENGINE_OIL"),
            Some(FluidType::Engine)
        );
        assert_eq!(
            FluidType::from_category_code("POWER_STEERING"),
            Some(FluidType::PowerSteering)
        );
        assert_eq!(FluidType::from_category_code("TYRE_PRESSURE"), None);
    }

    #[test]
    fn test_str_round_trip() {
        for ft in [
            FluidType::Engine,
            FluidType::Transmission,
            FluidType::Brake,
            FluidType::Coolant,
            FluidType::PowerSteering,
            FluidType::Differential,
        ] {
            assert_eq!(FluidType::from_str(ft.as_str()), Some(ft));
        }
    }
}
