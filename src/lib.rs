//! # plainsql
//!
//! > **Keep your SQL. Hook your data.**
//!
//! plainsql resolves SQL templates with named placeholders into final SQL
//! text, escaping every value through a database adapter, and optionally
//! executes the result.
//!
//! ## Quick Example
//!
//! ```
//! use plainsql::prelude::*;
//!
//! let params = ParamBag::new()
//!     .set("name", "john")
//!     .set("ids", vec![1, 2, 3]);
//!
//! let sql = plainsql::resolve(
//!     &params,
//!     "SELECT * FROM user WHERE name = :name AND id IN :ids",
//!     &Postgres,
//! )
//! .unwrap();
//! assert_eq!(sql, "SELECT * FROM user WHERE name = 'john' AND id IN (1, 2, 3)");
//! ```
//!
//! ## Placeholders
//!
//! | Syntax           | Name     | Renders                                  |
//! |------------------|----------|------------------------------------------|
//! | `:?`             | Anon     | Next positional value                    |
//! | `:name`          | Static   | Escaped scalar or `(a, b)` list          |
//! | `:!name`         | Raw      | Scalar text, unescaped                   |
//! | `:~name`         | Dynamic  | Condition parts joined by an operator    |
//! | `:$name{a, b}`   | Insert   | `(a, b)` values of a record              |
//! | `:@name{a, b}`   | Update   | `a = 1, b = 2` assignments of a record   |
//! | `:*name{x = *}`  | Optional | Fragment with `*` replaced, or nothing   |
//!
//! `::` is never a placeholder, so `x::int` type casts survive.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod escape;
pub mod loader;
pub mod query;
pub mod resolve;
pub mod template;
pub mod value;

pub mod prelude {
    pub use crate::adapter::{
        Adapter, DialectKind, EchoAdapter, Executor, MsSql, MySql, Postgres, QueryFuture, Row, Sqlite,
    };
    pub use crate::engine::SqlxAdapter;
    pub use crate::error::*;
    pub use crate::loader::{load_queries, Queries};
    pub use crate::query::{define_query, Query};
    pub use crate::resolve::resolve;
    pub use crate::template::{Modifier, Placeholder, Template};
    pub use crate::value::{Condition, ParamBag, Record, Scalar, Value};
}

/// Resolve `template` against `params`, escaping through `adapter`.
///
/// # Example
///
/// ```
/// use plainsql::prelude::*;
///
/// let sql = plainsql::resolve(&ParamBag::new().positional(vec![5]), "SELECT :?::int", &Postgres).unwrap();
/// assert_eq!(sql, "SELECT 5::int");
/// ```
pub fn resolve(
    params: &value::ParamBag,
    template: &str,
    adapter: &dyn adapter::Adapter,
) -> error::PlainResult<String> {
    resolve::resolve(params, template, adapter)
}
