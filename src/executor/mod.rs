//! Join-query execution engine
//!
//! # Execution Flow (strict order)
//!
//! 1. Resolve the source collection and every join target
//! 2. Compile the driving condition, every placeholder and every transform
//! 3. Run the driving query once against the source
//! 4. Per candidate, for each join in declared order: patch its condition
//!    for the candidate, fetch, apply the join's expose transform, attach
//! 5. Per candidate, apply the record-scope expose transform
//! 6. Materialize the first candidate (`single`) or the ordered list
//!
//! Steps 1 and 2 finish before any record is read, so malformed requests fail
//! without touching storage. Any error in steps 3 to 5 fails the whole search.

mod errors;
mod expose;
mod join;
mod patcher;
mod request;
mod search;
mod select;

pub use errors::{JoinFailure, SearchError, SearchResult};
pub use expose::{expose, ExposeScope, ExposeTransform};
pub use join::{attach, JoinStep, JoinStrategy};
pub use patcher::{ConditionTemplate, Patch, PathSegment, PLACEHOLDER_MARKER};
pub use request::{JoinSpecification, SearchRequest};
pub use search::{execute_search, SearchOutput};
pub use select::SelectPipeline;
