pub mod core;
pub mod models;
pub mod store;

pub use crate::core::{CatalogSource, Environment, RemoteCatalog};
pub use models::{Artifacts, FetchError, ResourceManager};
pub use store::{Node, StoreError, Value};
