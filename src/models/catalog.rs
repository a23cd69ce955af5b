//! The advisor's brand/model/type tree, cached on disk between runs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::normalize;

/// The most specific vehicle variant the advisor knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogType {
    pub id: String,
    pub name: String,
    pub brand_id: String,
    pub model_id: String,
    /// "Brand > Model > Type", for logs and debugging.
    pub full_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogModel {
    pub id: String,
    pub name: String,
    pub types: Vec<CatalogType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBrand {
    pub id: String,
    pub name: String,
    pub models: Vec<CatalogModel>,
}

/// The full advisor catalog plus derived lookup indexes.
///
/// Read-only once loaded; the indexes are rebuilt on load and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorCatalog {
    pub loaded_at: DateTime<Utc>,
    pub brands: Vec<CatalogBrand>,
    #[serde(skip)]
    brand_index: HashMap<String, usize>,
    #[serde(skip)]
    type_index: HashMap<(String, String), Vec<CatalogType>>,
}

impl AdvisorCatalog {
    pub fn new(loaded_at: DateTime<Utc>, brands: Vec<CatalogBrand>) -> Self {
        let mut catalog = Self {
            loaded_at,
            brands,
            brand_index: HashMap::new(),
            type_index: HashMap::new(),
        };
        catalog.build_indexes();
        catalog
    }

    /// Rebuild the normalized-name and (brand, model) indexes.
    /// Must be called after deserializing from the cache file.
    pub fn build_indexes(&mut self) {
        self.brand_index.clear();
        self.type_index.clear();
        for (i, brand) in self.brands.iter().enumerate() {
            self.brand_index.insert(normalize(&brand.name), i);
            for model in &brand.models {
                self.type_index
                    .insert((brand.id.clone(), model.id.clone()), model.types.clone());
            }
        }
    }

    pub fn find_brand(&self, name: &str) -> Option<&CatalogBrand> {
        self.brand_index
            .get(&normalize(name))
            .map(|&i| &self.brands[i])
    }

    pub fn brand_names(&self) -> Vec<String> {
        self.brands.iter().map(|b| b.name.clone()).collect()
    }

    pub fn model_names(&self, brand_name: &str) -> Vec<String> {
        self.find_brand(brand_name)
            .map(|b| b.models.iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }

    /// All vehicle types for a brand/model pair, matched by normalized name.
    pub fn vehicle_types(&self, brand_name: &str, model_name: &str) -> Vec<CatalogType> {
        let Some(brand) = self.find_brand(brand_name) else {
            return Vec::new();
        };
        let wanted = normalize(model_name);
        for model in &brand.models {
            if normalize(&model.name) == wanted {
                return self
                    .type_index
                    .get(&(brand.id.clone(), model.id.clone()))
                    .cloned()
                    .unwrap_or_default();
            }
        }
        Vec::new()
    }

    pub fn total_models(&self) -> usize {
        self.brands.iter().map(|b| b.models.len()).sum()
    }

    pub fn total_types(&self) -> usize {
        self.brands
            .iter()
            .flat_map(|b| &b.models)
            .map(|m| m.types.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> AdvisorCatalog {
        AdvisorCatalog::new(
            Utc::now(),
            vec![CatalogBrand {
                id: "b1".into(),
                name: "Volkswagen".into(),
                models: vec![CatalogModel {
                    id: "m1".into(),
                    name: "Gol".into(),
                    types: vec![CatalogType {
                        id: "157067".into(),
                        name: "Gol 1.0 12V (2019 - )".into(),
                        brand_id: "b1".into(),
                        model_id: "m1".into(),
                        full_path: "Volkswagen > Gol > Gol 1.0 12V (2019 - )".into(),
                    }],
                }],
            }],
        )
    }

    #[test]
    fn test_brand_lookup_is_normalized() {
        let catalog = sample_catalog();
        assert!(catalog.find_brand("volkswagen").is_some());
        assert!(catalog.find_brand("  VOLKSWAGEN ").is_some());
        assert!(catalog.find_brand("vw").is_none());
    }

    #[test]
    fn test_vehicle_types_by_model_name() {
        let catalog = sample_catalog();
        let types = catalog.vehicle_types("Volkswagen", "gol");
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].id, "157067");
        assert!(catalog.vehicle_types("Volkswagen", "Polo").is_empty());
    }
}
