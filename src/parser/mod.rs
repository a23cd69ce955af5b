//! Normalizes advisor recommendation payloads into oil specifications.
//!
//! Two historical response shapes exist: the current structured component
//! objects and an older flat heterogeneous array. Both are handled here so
//! the rest of the system only ever sees `ParsedSpec`.

use std::sync::OnceLock;

use regex::Regex;

use crate::clients::{AdvisorComponent, Components, SpecificationsResponse};
use crate::models::FluidType;

fn viscosity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+W-?\d+\b").unwrap())
}

fn capacity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+[,.]\d*\s*(?:L|l|litros?)?\b").unwrap())
}

/// A specification extracted from one component of the advisor response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSpec {
    pub fluid_type: FluidType,
    pub viscosity: Option<String>,
    pub capacity: Option<String>,
    pub norm: Option<String>,
    pub recommendation: Option<String>,
    pub observation: Option<String>,
}

/// Extract specifications from a recommendations response, dispatching on
/// the component shape. Returns an empty vector when nothing usable exists.
pub fn parse_specifications(response: &SpecificationsResponse) -> Vec<ParsedSpec> {
    match &response.vehicle.components {
        Components::Structured(components) => components
            .iter()
            .filter_map(parse_structured_component)
            .collect(),
        Components::Flat(values) => parse_flat_components(values),
    }
}

fn parse_structured_component(component: &AdvisorComponent) -> Option<ParsedSpec> {
    let fluid_type = FluidType::from_category_code(&component.category.code)?;

    let capacities: Vec<String> = component
        .capacities
        .iter()
        .filter(|c| !c.label.is_empty())
        .map(|c| format!("{} L", c.label))
        .collect();
    let capacity = join_nonempty(&capacities);

    let mut products: Vec<String> = Vec::new();
    let mut viscosities: Vec<String> = Vec::new();
    for recommendation in &component.recommendations {
        for product in &recommendation.products {
            if product.name.is_empty() {
                continue;
            }
            push_unique(&mut products, product.name.clone());
            for token in product.name.split_whitespace() {
                if viscosity_regex().is_match(token) {
                    push_unique(&mut viscosities, token.to_string());
                }
            }
        }
    }

    let recommendation = join_nonempty(&products);
    let viscosity = join_nonempty(&viscosities);

    if viscosity.is_none() && capacity.is_none() && recommendation.is_none() {
        return None;
    }

    Some(ParsedSpec {
        fluid_type,
        viscosity,
        capacity,
        norm: None,
        recommendation,
        observation: None,
    })
}

/// The legacy flat array mixes category labels, viscosities and numbers.
/// Category keywords anchor a bounded scan around their position.
fn parse_flat_components(values: &[serde_json::Value]) -> Vec<ParsedSpec> {
    const WINDOW: usize = 20;
    const TRANSMISSION_KEYWORDS: [&str; 4] = ["transmissão", "transmissao", "cambio", "câmbio"];

    let strings: Vec<Option<&str>> = values.iter().map(|v| v.as_str()).collect();
    let mut specs = Vec::new();

    for (i, value) in strings.iter().enumerate() {
        let Some(text) = value else { continue };
        let lower = text.to_lowercase();

        let fluid_type = if lower == "motor" {
            Some(FluidType::Engine)
        } else if TRANSMISSION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Some(FluidType::Transmission)
        } else {
            None
        };
        let Some(fluid_type) = fluid_type else { continue };

        let viscosity = find_in_window(&strings, i, WINDOW, |s| {
            viscosity_regex().find(s).map(|m| m.as_str().to_string())
        });
        // Only anchored entries with a viscosity nearby are trusted.
        let Some(viscosity) = viscosity else { continue };

        let capacity = find_in_window(&strings, i, WINDOW, |s| {
            capacity_regex().find(s).map(|m| {
                let normalized = m.as_str().replace(',', ".");
                if normalized.contains('L') || normalized.contains('l') {
                    normalized
                } else {
                    format!("{} L", normalized.trim())
                }
            })
        });

        specs.push(ParsedSpec {
            fluid_type,
            viscosity: Some(viscosity),
            capacity,
            norm: None,
            recommendation: Some("Primaria".to_string()),
            observation: None,
        });
    }

    specs
}

/// Scan forward from the anchor first (values follow their category label),
/// then backward, staying within the radius.
fn find_in_window<F>(
    strings: &[Option<&str>],
    center: usize,
    radius: usize,
    extract: F,
) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let start = center.saturating_sub(radius);
    let end = (center + radius).min(strings.len());

    let forward = center..end;
    let backward = (start..center).rev();
    for i in forward.chain(backward) {
        if let Some(value) = strings[i] {
            if let Some(found) = extract(value) {
                return Some(found);
            }
        }
    }
    None
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn join_nonempty(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        ComponentCapacity, ComponentCategory, ComponentRecommendation, RecommendedProduct,
        SpecificationsVehicle,
    };

    fn structured_response(components: Vec<AdvisorComponent>) -> SpecificationsResponse {
        SpecificationsResponse {
            vehicle: SpecificationsVehicle {
                category_id: "CAR".into(),
                brand: "Volkswagen".into(),
                type_name: "Gol 1.0 12V (2019 - )".into(),
                model: "Gol".into(),
                components: Components::Structured(components),
            },
        }
    }

    fn engine_component(products: &[&str], capacity_labels: &[&str]) -> AdvisorComponent {
        AdvisorComponent {
            category: ComponentCategory {
                code: "ENGINE_OIL".into(),
                name: "Motor".into(),
            },
            capacities: capacity_labels
                .iter()
                .map(|l| ComponentCapacity { label: l.to_string() })
                .collect(),
            recommendations: vec![ComponentRecommendation {
                products: products
                    .iter()
                    .map(|n| RecommendedProduct { name: n.to_string() })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_structured_engine_component() {
        let response = structured_response(vec![engine_component(
            &["8100 ECO-NERGY 5W-30", "SPECIFIC 508 00 509 00 0W-20"],
            &["3.5"],
        )]);

        let specs = parse_specifications(&response);
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.fluid_type, FluidType::Engine);
        assert_eq!(spec.capacity.as_deref(), Some("3.5 L"));
        assert_eq!(spec.viscosity.as_deref(), Some("5W-30, 0W-20"));
        assert_eq!(
            spec.recommendation.as_deref(),
            Some("8100 ECO-NERGY 5W-30, SPECIFIC 508 00 509 00 0W-20")
        );
    }

    #[test]
    fn test_every_viscosity_token_is_emitted() {
        let names = ["A 5W-30", "B 10W40", "C 0W-20", "D 5W-30"];
        let response = structured_response(vec![engine_component(&names, &[])]);
        let specs = parse_specifications(&response);
        let viscosity = specs[0].viscosity.as_deref().unwrap();

        for name in names {
            let token = name.split_whitespace().last().unwrap();
            assert!(viscosity.contains(token), "{} missing from {}", token, viscosity);
        }
        // Deduplicated: "5W-30" appears only once.
        assert_eq!(viscosity.matches("5W-30").count(), 1);
    }

    #[test]
    fn test_unknown_category_is_skipped() {
        let mut component = engine_component(&["Product 5W-30"], &[]);
        component.category.code = "WASHER_FLUID".into();
        let specs = parse_specifications(&structured_response(vec![component]));
        assert!(specs.is_empty());
    }

    #[test]
    fn test_empty_component_is_skipped() {
        let component = engine_component(&[], &[]);
        let specs = parse_specifications(&structured_response(vec![component]));
        assert!(specs.is_empty());
    }

    #[test]
    fn test_flat_shape_with_window_scan() {
        let values: Vec<serde_json::Value> = vec![
            serde_json::json!("Motor"),
            serde_json::json!("8100 X-CLEAN 5W-40"),
            serde_json::json!("4,8"),
            serde_json::json!("Câmbio manual"),
            serde_json::json!("MOTYLGEAR 75W-90"),
            serde_json::json!("2,1"),
        ];
        let response = SpecificationsResponse {
            vehicle: SpecificationsVehicle {
                category_id: "CAR".into(),
                brand: "Fiat".into(),
                type_name: "Uno".into(),
                model: "Uno".into(),
                components: Components::Flat(values),
            },
        };

        let specs = parse_specifications(&response);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].fluid_type, FluidType::Engine);
        assert_eq!(specs[0].viscosity.as_deref(), Some("5W-40"));
        assert_eq!(specs[0].capacity.as_deref(), Some("4.8 L"));
        assert_eq!(specs[1].fluid_type, FluidType::Transmission);
        assert_eq!(specs[1].viscosity.as_deref(), Some("75W-90"));
        assert_eq!(specs[1].capacity.as_deref(), Some("2.1 L"));
    }
}
