pub mod catalog;
pub mod environment;

pub use catalog::{load_catalog, CatalogSource, RemoteCatalog, DEFAULT_CATALOG_URL};
pub use environment::{Environment, CONFIG_FILE};
