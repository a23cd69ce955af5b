//! Brand/model/type resolution against the advisor catalog.
//!
//! Resolution is layered: exact normalized lookups first, then cheap
//! heuristics, and only then the LLM. Every decision is cached for the
//! lifetime of the matcher, which is scoped to one crawl run.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::clients::{DisambiguatorClient, LlmError};
use crate::models::{AdvisorCatalog, CatalogType};

use super::{contains_significant_parts, normalize};

/// Fixed alias table consulted before asking the LLM about a brand.
const BRAND_ALIASES: [(&str, &str); 8] = [
    ("vw", "volkswagen"),
    ("volkswagen", "volkswagen"),
    ("bmw", "bmw"),
    ("mercedes", "mercedes-benz"),
    ("merc", "mercedes-benz"),
    ("gm", "chevrolet"),
    ("chevy", "chevrolet"),
    ("fiat", "fiat"),
];

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("brand not found: {0}")]
    BrandNotFound(String),
    #[error("no models found for brand {0}")]
    NoModels(String),
    #[error("no vehicle types found for {brand} {model}")]
    NoTypes { brand: String, model: String },
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// How a match was decided. Single-type and significant-parts matches are
/// treated as exact for confidence purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    Single,
    Exact,
    Llm,
    Fallback,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Exact => "exact",
            Self::Llm => "llm",
            Self::Fallback => "fallback",
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Single | Self::Exact)
    }
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub vehicle_type: CatalogType,
    pub confidence: f64,
    pub method: MatchMethod,
    pub advisor_brand: String,
    pub advisor_model: String,
}

/// Catalog- and LLM-backed matcher with per-run caches.
pub struct SmartMatcher {
    catalog: Arc<AdvisorCatalog>,
    llm: Arc<DisambiguatorClient>,
    brand_cache: RwLock<HashMap<String, String>>,
    model_cache: RwLock<HashMap<String, String>>,
    type_cache: RwLock<HashMap<String, MatchResult>>,
}

impl SmartMatcher {
    pub fn new(catalog: Arc<AdvisorCatalog>, llm: Arc<DisambiguatorClient>) -> Self {
        Self {
            catalog,
            llm,
            brand_cache: RwLock::new(HashMap::new()),
            model_cache: RwLock::new(HashMap::new()),
            type_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the best advisor vehicle type for a local vehicle.
    pub async fn find_match(
        &self,
        brand: &str,
        model: &str,
        description: &str,
        year: i32,
    ) -> Result<MatchResult, MatchError> {
        let type_key = format!("{}:{}:{}", brand, model, description);
        if let Some(cached) = self.type_cache.read().unwrap().get(&type_key) {
            return Ok(cached.clone());
        }

        let advisor_brand = self.match_brand(brand).await?;
        let advisor_model = self.match_model(&advisor_brand, model).await?;

        let types = self.catalog.vehicle_types(&advisor_brand, &advisor_model);
        if types.is_empty() {
            return Err(MatchError::NoTypes {
                brand: advisor_brand,
                model: advisor_model,
            });
        }

        let result = self
            .match_type(&advisor_brand, &advisor_model, description, year, types)
            .await;

        self.type_cache
            .write()
            .unwrap()
            .insert(type_key, result.clone());
        Ok(result)
    }

    async fn match_brand(&self, brand: &str) -> Result<String, MatchError> {
        if let Some(cached) = self.brand_cache.read().unwrap().get(brand) {
            return Ok(cached.clone());
        }

        if let Some(found) = self.catalog.find_brand(brand) {
            let name = found.name.clone();
            self.cache_brand(brand, &name);
            return Ok(name);
        }

        let normalized = normalize(brand);
        if let Some((_, alias)) = BRAND_ALIASES.iter().find(|(from, _)| *from == normalized) {
            if let Some(found) = self.catalog.find_brand(alias) {
                let name = found.name.clone();
                self.cache_brand(brand, &name);
                return Ok(name);
            }
        }

        let brand_names = self.catalog.brand_names();
        if brand_names.is_empty() {
            return Err(MatchError::BrandNotFound(brand.to_string()));
        }

        debug!(brand, "brand not in catalog, asking disambiguator");
        let matched = self.llm.best_match(brand, &brand_names).await?;
        self.cache_brand(brand, &matched);
        Ok(matched)
    }

    fn cache_brand(&self, local: &str, advisor: &str) {
        self.brand_cache
            .write()
            .unwrap()
            .insert(local.to_string(), advisor.to_string());
    }

    async fn match_model(&self, advisor_brand: &str, model: &str) -> Result<String, MatchError> {
        let cache_key = format!("{}:{}", advisor_brand, model);
        if let Some(cached) = self.model_cache.read().unwrap().get(&cache_key) {
            return Ok(cached.clone());
        }

        let model_names = self.catalog.model_names(advisor_brand);
        if model_names.is_empty() {
            return Err(MatchError::NoModels(advisor_brand.to_string()));
        }

        let normalized = normalize(model);

        let found = model_names
            .iter()
            .find(|name| normalize(name) == normalized)
            .or_else(|| {
                // Catalog model name contained in the local model string
                // ("HB 20" in "hb 20 comfort plus").
                model_names
                    .iter()
                    .find(|name| normalized.contains(&normalize(name)))
            });

        let matched = match found {
            Some(name) => name.clone(),
            None => {
                debug!(model, brand = advisor_brand, "model needs disambiguation");
                self.llm.best_match(model, &model_names).await?
            }
        };

        self.model_cache.write().unwrap().insert(cache_key, matched.clone());
        Ok(matched)
    }

    async fn match_type(
        &self,
        advisor_brand: &str,
        advisor_model: &str,
        description: &str,
        year: i32,
        types: Vec<CatalogType>,
    ) -> MatchResult {
        if types.len() == 1 {
            return MatchResult {
                vehicle_type: types.into_iter().next().unwrap(),
                confidence: 1.0,
                method: MatchMethod::Single,
                advisor_brand: advisor_brand.to_string(),
                advisor_model: advisor_model.to_string(),
            };
        }

        if let Some(vt) = types
            .iter()
            .find(|vt| contains_significant_parts(&vt.name, description))
        {
            return MatchResult {
                vehicle_type: vt.clone(),
                confidence: 0.95,
                method: MatchMethod::Exact,
                advisor_brand: advisor_brand.to_string(),
                advisor_model: advisor_model.to_string(),
            };
        }

        let mut full_description = format!("{} {} {}", advisor_brand, advisor_model, description);
        if year > 0 {
            full_description.push_str(&format!(" ({})", year));
        }
        let type_names: Vec<String> = types.iter().map(|t| t.name.clone()).collect();

        match self.llm.best_match(&full_description, &type_names).await {
            Ok(matched_name) => {
                if let Some(vt) = types.iter().find(|vt| vt.name == matched_name) {
                    return MatchResult {
                        vehicle_type: vt.clone(),
                        confidence: 0.85,
                        method: MatchMethod::Llm,
                        advisor_brand: advisor_brand.to_string(),
                        advisor_model: advisor_model.to_string(),
                    };
                }
            }
            Err(e) => {
                warn!(error = %e, target = full_description, "LLM type matching failed");
            }
        }

        MatchResult {
            vehicle_type: types.into_iter().next().unwrap(),
            confidence: 0.5,
            method: MatchMethod::Fallback,
            advisor_brand: advisor_brand.to_string(),
            advisor_model: advisor_model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ChatApi, ChatReply, LlmConfig};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    use crate::clients::ChatRequest;
    use crate::models::{CatalogBrand, CatalogModel};

    /// Always answers with a fixed index and counts invocations.
    struct FixedIndexChat {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatApi for FixedIndexChat {
        async fn chat(&self, _key: &str, _req: &ChatRequest) -> Result<ChatReply, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatReply::Success {
                content: self.reply.to_string(),
                total_tokens: 2,
            })
        }
    }

    fn catalog_with_types(type_names: &[&str]) -> Arc<AdvisorCatalog> {
        let types: Vec<CatalogType> = type_names
            .iter()
            .enumerate()
            .map(|(i, name)| CatalogType {
                id: format!("t{}", i),
                name: name.to_string(),
                brand_id: "b1".into(),
                model_id: "m1".into(),
                full_path: format!("Hyundai > HB 20 > {}", name),
            })
            .collect();
        Arc::new(AdvisorCatalog::new(
            Utc::now(),
            vec![CatalogBrand {
                id: "b1".into(),
                name: "Hyundai".into(),
                models: vec![
                    CatalogModel {
                        id: "m1".into(),
                        name: "HB 20".into(),
                        types,
                    },
                    CatalogModel {
                        id: "m2".into(),
                        name: "Creta".into(),
                        types: vec![],
                    },
                ],
            }],
        ))
    }

    fn matcher_with(
        catalog: Arc<AdvisorCatalog>,
        reply: &'static str,
    ) -> (SmartMatcher, Arc<FixedIndexChat>) {
        let stub = Arc::new(FixedIndexChat {
            reply,
            calls: AtomicUsize::new(0),
        });
        let llm = DisambiguatorClient::with_transport(
            stub.clone(),
            vec!["test-key".into()],
            LlmConfig {
                requests_per_minute: 60_000.0,
                ..Default::default()
            },
            CancellationToken::new(),
        );
        (SmartMatcher::new(catalog, llm), stub)
    }

    #[tokio::test]
    async fn test_single_type_short_circuit() {
        let catalog = catalog_with_types(&["HB 20 1.0 12V (2019 - )"]);
        let (matcher, stub) = matcher_with(catalog, "1");

        let result = matcher
            .find_match("Hyundai", "HB 20", "HB20 Comfort 1.0", 2020)
            .await
            .unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.method, MatchMethod::Single);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_significant_parts_beats_llm() {
        let catalog = catalog_with_types(&["HB 20 1.0 12V", "HB 20 1.6 16V"]);
        let (matcher, stub) = matcher_with(catalog, "2");

        let result = matcher
            .find_match("Hyundai", "HB 20", "HB20 1.0 12V Comfort", 2020)
            .await
            .unwrap();
        assert_eq!(result.vehicle_type.name, "HB 20 1.0 12V");
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.method, MatchMethod::Exact);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_llm_resolution_and_cache_determinism() {
        let catalog = catalog_with_types(&["HB 20S Premium", "HB 20 Vision", "HB 20X Adventure"]);
        let (matcher, stub) = matcher_with(catalog, "2");

        let first = matcher
            .find_match("Hyundai", "HB 20", "Comfort Plus", 2021)
            .await
            .unwrap();
        assert_eq!(first.vehicle_type.name, "HB 20 Vision");
        assert_eq!(first.confidence, 0.85);
        assert_eq!(first.method, MatchMethod::Llm);

        // Warm caches: the repeat match must not touch the provider again
        // and must return the identical decision.
        let calls_after_first = stub.calls.load(Ordering::SeqCst);
        let second = matcher
            .find_match("Hyundai", "HB 20", "Comfort Plus", 2021)
            .await
            .unwrap();
        assert_eq!(second.vehicle_type.id, first.vehicle_type.id);
        assert_eq!(second.confidence, first.confidence);
        assert_eq!(stub.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_brand_alias_resolution() {
        let catalog = Arc::new(AdvisorCatalog::new(
            Utc::now(),
            vec![CatalogBrand {
                id: "b1".into(),
                name: "Chevrolet".into(),
                models: vec![CatalogModel {
                    id: "m1".into(),
                    name: "Onix".into(),
                    types: vec![CatalogType {
                        id: "t1".into(),
                        name: "Onix 1.0".into(),
                        brand_id: "b1".into(),
                        model_id: "m1".into(),
                        full_path: "Chevrolet > Onix > Onix 1.0".into(),
                    }],
                }],
            }],
        ));
        let (matcher, stub) = matcher_with(catalog, "1");

        let result = matcher.find_match("GM", "Onix", "Onix 1.0", 2022).await.unwrap();
        assert_eq!(result.advisor_brand, "Chevrolet");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_goes_through_llm() {
        let catalog = catalog_with_types(&["HB 20 1.0"]);
        let (matcher, _stub) = matcher_with(catalog, "1");

        // "Tucson" is not in the brand's model list; stub answers index 1
        // over ["HB 20", "Creta"].
        let result = matcher
            .find_match("Hyundai", "Tucson", "Tucson GLS", 2015)
            .await
            .unwrap();
        assert_eq!(result.advisor_model, "HB 20");
    }

    #[tokio::test]
    async fn test_missing_types_is_an_error() {
        let catalog = catalog_with_types(&["HB 20 1.0"]);
        let (matcher, _stub) = matcher_with(catalog, "2");

        // "Creta" exists but has no types.
        let err = matcher
            .find_match("Hyundai", "Creta", "Creta Attitude", 2019)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::NoTypes { .. }));
    }
}
