//! One-shot load of the advisor's brand/model/type tree with an on-disk
//! JSON cache.
//!
//! The crawl is expensive (brands × sample years × models), so the
//! assembled tree is persisted and reused until it goes stale.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::clients::{AdvisorClient, AdvisorError};
use crate::models::{AdvisorCatalog, CatalogBrand, CatalogModel, CatalogType};

/// Cache entries older than this are refetched.
const FRESHNESS_WINDOW_DAYS: i64 = 7;

/// The advisor returns year-conditional model lists, so models are collected
/// across a fixed spread of sample years and deduplicated by id.
const SAMPLE_YEARS: [i32; 9] = [2024, 2023, 2022, 2020, 2018, 2015, 2010, 2005, 2000];

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to fetch catalog: {0}")]
    Fetch(#[from] AdvisorError),
    #[error("catalog cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog cache: {0}")]
    Cache(#[from] serde_json::Error),
}

pub struct CatalogLoader<'a> {
    advisor: &'a AdvisorClient,
    cache_path: PathBuf,
}

impl<'a> CatalogLoader<'a> {
    pub fn new(advisor: &'a AdvisorClient, cache_path: &Path) -> Self {
        Self {
            advisor,
            cache_path: cache_path.to_path_buf(),
        }
    }

    /// Load the cached catalog if fresh enough, otherwise crawl the advisor
    /// and persist the result atomically.
    pub async fn load_or_fetch(&self) -> Result<AdvisorCatalog, CatalogError> {
        match self.load_from_cache() {
            Ok(catalog) => {
                info!(
                    path = %self.cache_path.display(),
                    brands = catalog.brands.len(),
                    loaded_at = %catalog.loaded_at,
                    "loaded advisor catalog from cache"
                );
                return Ok(catalog);
            }
            Err(e) => {
                debug!(error = %e, "catalog cache unusable, fetching from API");
            }
        }

        info!("fetching advisor catalog (this may take a few minutes)");
        let catalog = self.fetch_from_api().await?;

        if let Err(e) = self.save_to_cache(&catalog) {
            warn!(error = %e, "failed to persist catalog cache");
        } else {
            info!(path = %self.cache_path.display(), "saved advisor catalog cache");
        }

        Ok(catalog)
    }

    fn load_from_cache(&self) -> Result<AdvisorCatalog, CatalogError> {
        let data = std::fs::read_to_string(&self.cache_path)?;
        let mut catalog: AdvisorCatalog = serde_json::from_str(&data)?;

        if Utc::now() - catalog.loaded_at > Duration::days(FRESHNESS_WINDOW_DAYS) {
            return Err(CatalogError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "cache is stale",
            )));
        }

        catalog.build_indexes();
        Ok(catalog)
    }

    /// Write-temp-then-rename so a crash never leaves a torn cache file.
    fn save_to_cache(&self, catalog: &AdvisorCatalog) -> Result<(), CatalogError> {
        let data = serde_json::to_string_pretty(catalog)?;
        let dir = self.cache_path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.persist(&self.cache_path)
            .map_err(|e| CatalogError::Io(e.error))?;
        Ok(())
    }

    async fn fetch_from_api(&self) -> Result<AdvisorCatalog, CatalogError> {
        let brands = self.advisor.get_brands().await?;
        info!(count = brands.len(), "fetched brands");

        let mut catalog_brands = Vec::with_capacity(brands.len());

        for (i, brand) in brands.iter().enumerate() {
            let mut models: Vec<CatalogModel> = Vec::new();
            let mut seen_models = std::collections::HashSet::new();

            for year in SAMPLE_YEARS {
                let year_models = match self.advisor.get_models(&brand.id, year).await {
                    Ok(m) => m,
                    Err(AdvisorError::Cancelled) => return Err(AdvisorError::Cancelled.into()),
                    Err(e) => {
                        debug!(brand = brand.name, year, error = %e, "model listing failed");
                        continue;
                    }
                };

                for model in year_models {
                    if !seen_models.insert(model.id.clone()) {
                        continue;
                    }

                    let types = match self.advisor.get_vehicle_types(&model.id).await {
                        Ok(types) => types
                            .into_iter()
                            .map(|vt| CatalogType {
                                full_path: format!("{} > {} > {}", brand.name, model.name, vt.name),
                                id: vt.id,
                                name: vt.name,
                                brand_id: brand.id.clone(),
                                model_id: model.id.clone(),
                            })
                            .collect(),
                        Err(AdvisorError::Cancelled) => return Err(AdvisorError::Cancelled.into()),
                        Err(e) => {
                            debug!(
                                brand = brand.name,
                                model = model.name,
                                error = %e,
                                "type listing failed"
                            );
                            Vec::new()
                        }
                    };

                    models.push(CatalogModel {
                        id: model.id,
                        name: model.name,
                        types,
                    });
                }
            }

            catalog_brands.push(CatalogBrand {
                id: brand.id.clone(),
                name: brand.name.clone(),
                models,
            });

            if (i + 1) % 10 == 0 {
                info!(processed = i + 1, total = brands.len(), "catalog crawl progress");
            }
        }

        let catalog = AdvisorCatalog::new(Utc::now(), catalog_brands);
        info!(
            brands = catalog.brands.len(),
            models = catalog.total_models(),
            types = catalog.total_types(),
            "catalog crawl complete"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tiny_catalog(loaded_at: chrono::DateTime<Utc>) -> AdvisorCatalog {
        AdvisorCatalog::new(
            loaded_at,
            vec![CatalogBrand {
                id: "b1".into(),
                name: "Fiat".into(),
                models: vec![CatalogModel {
                    id: "m1".into(),
                    name: "Uno".into(),
                    types: vec![CatalogType {
                        id: "t1".into(),
                        name: "Uno 1.0".into(),
                        brand_id: "b1".into(),
                        model_id: "m1".into(),
                        full_path: "Fiat > Uno > Uno 1.0".into(),
                    }],
                }],
            }],
        )
    }

    #[test]
    fn test_cache_round_trip_rebuilds_indexes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let data = serde_json::to_string(&tiny_catalog(Utc::now())).unwrap();
        std::fs::write(&path, data).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        let mut restored: AdvisorCatalog = serde_json::from_str(&json).unwrap();
        restored.build_indexes();

        assert!(restored.find_brand("fiat").is_some());
        assert_eq!(restored.vehicle_types("Fiat", "Uno").len(), 1);
    }

    #[test]
    fn test_stale_cache_detection() {
        let old = tiny_catalog(Utc::now() - Duration::days(FRESHNESS_WINDOW_DAYS + 1));
        assert!(Utc::now() - old.loaded_at > Duration::days(FRESHNESS_WINDOW_DAYS));

        let fresh = tiny_catalog(Utc::now());
        assert!(Utc::now() - fresh.loaded_at <= Duration::days(FRESHNESS_WINDOW_DAYS));
    }
}
