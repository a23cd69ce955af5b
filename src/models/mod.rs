//! Domain models shared across the crawler and the catalog API.

mod catalog;
mod failure;
mod spec;
mod vehicle;

pub use catalog::{AdvisorCatalog, CatalogBrand, CatalogModel, CatalogType};
pub use failure::{ErrorKind, FailureRecord};
pub use spec::{FluidType, NewOilSpecification, OilSpecification};
pub use vehicle::Vehicle;
