//! Local vehicle records from the preexisting catalog.

use serde::{Deserialize, Serialize};

/// A vehicle row from the local catalog. Immutable for the lifetime of a crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i32,
    pub brand: String,
    pub model: String,
    /// Free-text description, e.g. "Gol - 1.0 3 Cil 12V - 84 cv - Total Flex - 2019 -->".
    pub description: String,
    /// Engine designation as printed in the catalog ("1.0 12V", "EA211", ...).
    pub engine: String,
    /// Production period string ("2015 - 2019", "2019 -->", a bare year, ...).
    pub period: String,
}

impl Vehicle {
    /// Short label for progress display and logs.
    pub fn label(&self) -> String {
        let desc: String = self.description.chars().take(50).collect();
        format!("#{} {}", self.id, desc)
    }
}
