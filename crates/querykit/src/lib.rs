//! # querykit
//!
//! Search-object driven SQL for PostgreSQL-style clients.
//!
//! ## Features
//!
//! - **Search objects**: filters are data (`{"age": {"$gte": 18}, "deleted_at": null}`),
//!   compiled into fragments plus an ordered value list
//! - **Two placeholder dialects**: numbered `$n` and unnumbered `?`, sharing one renderer
//! - **One cursor per statement**: WHERE, HAVING and spliced subqueries never reuse a number
//! - **Branchable builder**: clone a filtered prefix into a list query and a count query
//! - **Managed transactions**: isolation level, timeout-triggered rollback,
//!   exactly-once connection release
//!
//! ## Compiler + renderer
//!
//! ```ignore
//! use querykit::{Dialect, RenderRequest, SearchSpec, compare_fields, get_fields_to_search};
//!
//! let spec = SearchSpec::from_json(&body["filter"])?;
//! let group = compare_fields(&spec, None)?;
//! let clauses = get_fields_to_search(&group, &RenderRequest::new(Dialect::Numbered))?;
//! let sql = format!("SELECT * FROM users {}", clauses.search_fields);
//! ```
//!
//! ## Query builder
//!
//! ```ignore
//! let rows = querykit::select("users", &client)
//!     .filter(SearchSpec::new().value("status", "active"))
//!     .order_by(OrderBy::desc("created_at"))
//!     .pagination(Pagination::new(20, 0))
//!     .execute()
//!     .await?;
//! ```

pub mod builder;
pub mod compile;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod ident;
pub mod operator;
pub mod render;
pub mod search;
pub mod transaction;
pub mod value;

pub use builder::{FromSource, Join, JoinKind, QueryBuilder, SubQuery, select};
pub use compile::{CompiledGroup, Fragment, OrGroup, compare_fields};
pub use config::QueryConfig;
pub use dialect::Dialect;
pub use error::{ConstraintKind, DbError, DbResult};
pub use executor::{CompiledQuery, Executor};
pub use operator::Operator;
pub use render::{
    OrderBy, OrderSpec, Pagination, RenderRequest, RenderedClauses, SortDirection, SortableFields,
    get_fields_to_search, render_conditions,
};
pub use search::{Condition, FieldFilter, Operands, OperatorObject, SearchGroup, SearchSpec};
pub use transaction::{
    ConnectionPool, IsolationLevel, TransactionConnection, TransactionManager, TransactionOptions,
    transaction,
};
pub use value::Value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
