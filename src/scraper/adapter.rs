//! Bridges the smart matcher and the advisor client into the pipeline's
//! `OilAdvisor` seam.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::AdvisorClient;
use crate::matching::SmartMatcher;
use crate::parser::{parse_specifications, ParsedSpec};

use super::{MatchedVehicle, OilAdvisor};

pub struct AdvisorAdapter {
    matcher: SmartMatcher,
    advisor: Arc<AdvisorClient>,
}

impl AdvisorAdapter {
    pub fn new(matcher: SmartMatcher, advisor: Arc<AdvisorClient>) -> Self {
        Self { matcher, advisor }
    }
}

#[async_trait]
impl OilAdvisor for AdvisorAdapter {
    async fn search_vehicle(
        &self,
        brand: &str,
        model: &str,
        description: &str,
        year: i32,
    ) -> anyhow::Result<MatchedVehicle> {
        let result = self.matcher.find_match(brand, model, description, year).await?;
        Ok(MatchedVehicle {
            type_id: result.vehicle_type.id,
            type_name: result.vehicle_type.name,
            advisor_brand: result.advisor_brand,
            advisor_model: result.advisor_model,
            confidence: result.confidence,
            method: result.method,
        })
    }

    async fn get_specifications(&self, type_id: &str) -> anyhow::Result<Vec<ParsedSpec>> {
        let response = self.advisor.get_specifications(type_id).await?;
        Ok(parse_specifications(&response))
    }
}
