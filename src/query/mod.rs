//! Query condition library
//!
//! Conditions are parsed once, validated eagerly, and then matched against
//! any number of records. Parsing failures surface before any collection is
//! touched.

mod condition;
mod errors;

pub use condition::QueryCondition;
pub use errors::{QueryError, QueryResult};

pub(crate) use condition::kind_of;
