//! SELECT builder over search objects.
//!
//! ```ignore
//! use querykit::{Join, OrderBy, Pagination, SearchSpec, SortableFields};
//!
//! let base = querykit::select("users u", &client)
//!     .left_join(Join::new("teams", "id", "u", "team_id").alias("t"))
//!     .filter(SearchSpec::new().value("u.status", "active"));
//!
//! let total = base.clone().into_count().execute().await?;
//! let page = base
//!     .select(&["u.id", "u.name", "t.name AS team"])
//!     .sortable(SortableFields::new(["u.id", "u.name"]))
//!     .order_by(OrderBy::desc("u.id"))
//!     .pagination(Pagination::new(20, 0))
//!     .execute()
//!     .await?;
//! ```
//!
//! - Placeholders are numbered automatically (`$1, $2, ...`) or emitted as `?`,
//!   depending on [`Executor::dialect`](crate::Executor::dialect).
//! - Validation errors are recorded when a clause is added and returned by
//!   `build()`/`execute()` before anything is sent.

pub mod join;
pub mod select;
pub mod subquery;

pub use join::{Join, JoinKind};
pub use select::QueryBuilder;
pub use subquery::{FromSource, SubQuery};

use crate::executor::Executor;

/// Start a SELECT over `source` using `executor`.
pub fn select<E: Executor>(source: impl Into<FromSource>, executor: E) -> QueryBuilder<E> {
    QueryBuilder::new(source, executor)
}
