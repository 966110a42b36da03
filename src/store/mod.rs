//! Path-addressable nested store used for configuration, the resource
//! catalog and generation parameters.

mod error;
mod export;
mod node;
mod path;
mod value;

pub use error::StoreError;
pub use export::{LOCAL_KEY, PRIVATE_KEY};
pub use node::Node;
pub use path::{is_reserved, PathExpr, RESERVED_PREFIX, SEPARATOR};
pub use value::Value;
