//! Adapter capabilities consumed by the resolver and the query wrapper.
//!
//! An adapter escapes scalars (mandatory), may escape identifiers (needed by
//! `:@name` placeholders) and may execute SQL. The built-in dialects are
//! escape-only; [`crate::engine::SqlxAdapter`] adds execution.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::error::BoxError;
use crate::value::Scalar;

/// A result row, keyed by column name.
pub type Row = HashMap<String, serde_json::Value>;

/// Future returned by [`Executor::query`].
pub type QueryFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Row>, BoxError>> + Send + 'a>>;

/// The escaping side of an adapter.
pub trait Adapter: Send + Sync {
    /// Render a scalar as a SQL literal.
    fn escape(&self, value: &Scalar) -> String;

    /// Render a column name. `None` when the backend has no identifier quoting.
    fn escape_identifier(&self, _name: &str) -> Option<String> {
        None
    }

    /// The execution side, if this adapter can run queries.
    fn executor(&self) -> Option<&dyn Executor> {
        None
    }
}

/// Runs resolved SQL.
pub trait Executor: Send + Sync {
    fn query<'a>(&'a self, sql: &'a str) -> QueryFuture<'a>;
}

/// SQL reserved words that must be quoted when used as identifiers.
const RESERVED_WORDS: &[&str] = &[
    "order", "group", "user", "table", "select", "from", "where", "join",
    "left", "right", "inner", "outer", "on", "and", "or", "not", "null",
    "true", "false", "limit", "offset", "as", "in", "is", "like", "between",
    "having", "union", "all", "distinct", "case", "when", "then", "else", "end",
    "create", "alter", "drop", "insert", "update", "delete", "index", "key",
    "primary", "foreign", "references", "default", "constraint", "check",
];

/// Quote an identifier with `"` unless PostgreSQL would read it back
/// unchanged: lowercase ASCII letters, digits and `_`, not starting with a
/// digit, and not a reserved word. Mixed case is quoted since unquoted names
/// fold to lower case.
pub fn quote_identifier_if_needed(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED_WORDS.contains(&name);

    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn single_quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// PostgreSQL literals and identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Adapter for Postgres {
    fn escape(&self, value: &Scalar) -> String {
        match value {
            Scalar::Null => "NULL".to_string(),
            Scalar::Bool(true) => "TRUE".to_string(),
            Scalar::Bool(false) => "FALSE".to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) if n.is_nan() => "'NaN'".to_string(),
            Scalar::Float(n) if n.is_infinite() && *n > 0.0 => "'Infinity'".to_string(),
            Scalar::Float(n) if n.is_infinite() => "'-Infinity'".to_string(),
            Scalar::Float(n) => n.to_string(),
            // E'' strings treat backslashes as escapes, so double them
            Scalar::Text(s) if s.contains('\\') => format!("E{}", single_quoted(&s.replace('\\', "\\\\"))),
            Scalar::Text(s) => single_quoted(s),
        }
    }

    fn escape_identifier(&self, name: &str) -> Option<String> {
        Some(quote_identifier_if_needed(name))
    }
}

/// MySQL / MariaDB literals and identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Adapter for MySql {
    fn escape(&self, value: &Scalar) -> String {
        match value {
            Scalar::Null => "NULL".to_string(),
            Scalar::Bool(true) => "TRUE".to_string(),
            Scalar::Bool(false) => "FALSE".to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) if !n.is_finite() => "NULL".to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Text(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\0' => out.push_str("\\0"),
                        '\u{8}' => out.push_str("\\b"),
                        '\t' => out.push_str("\\t"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\u{1a}' => out.push_str("\\Z"),
                        '"' => out.push_str("\\\""),
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        c => out.push(c),
                    }
                }
                out.push('\'');
                out
            }
        }
    }

    fn escape_identifier(&self, name: &str) -> Option<String> {
        Some(format!("`{}`", name.replace('`', "``")))
    }
}

/// SQLite literals and identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Adapter for Sqlite {
    fn escape(&self, value: &Scalar) -> String {
        match value {
            Scalar::Null => "NULL".to_string(),
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => "0".to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) if !n.is_finite() => "NULL".to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Text(s) => single_quoted(s),
        }
    }

    fn escape_identifier(&self, name: &str) -> Option<String> {
        Some(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

/// SQL Server literals and identifiers. Escape-only: there is no sqlx driver
/// for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSql;

impl Adapter for MsSql {
    fn escape(&self, value: &Scalar) -> String {
        match value {
            Scalar::Null => "NULL".to_string(),
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => "0".to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) if !n.is_finite() => "NULL".to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Text(s) => single_quoted(s),
        }
    }

    fn escape_identifier(&self, name: &str) -> Option<String> {
        Some(format!("[{}]", name.replace(']', "]]")))
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
    Mssql,
}

impl DialectKind {
    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(DialectKind::Postgres),
            "mysql" | "mariadb" => Some(DialectKind::Mysql),
            "sqlite" => Some(DialectKind::Sqlite),
            "mssql" | "sqlserver" => Some(DialectKind::Mssql),
            _ => None,
        }
    }

    /// The escape-only adapter for this dialect.
    pub fn adapter(self) -> &'static dyn Adapter {
        match self {
            DialectKind::Postgres => &Postgres,
            DialectKind::Mysql => &MySql,
            DialectKind::Sqlite => &Sqlite,
            DialectKind::Mssql => &MsSql,
        }
    }
}

/// Escapes nothing and "executes" by echoing the SQL back as a single row
/// `{"sql": ...}`. Meant for tests and dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoAdapter;

impl Adapter for EchoAdapter {
    fn escape(&self, value: &Scalar) -> String {
        value.to_string()
    }

    fn escape_identifier(&self, name: &str) -> Option<String> {
        Some(name.to_string())
    }

    fn executor(&self) -> Option<&dyn Executor> {
        Some(self)
    }
}

impl Executor for EchoAdapter {
    fn query<'a>(&'a self, sql: &'a str) -> QueryFuture<'a> {
        Box::pin(async move {
            let mut row = Row::new();
            row.insert("sql".to_string(), serde_json::Value::String(sql.to_string()));
            Ok::<_, BoxError>(vec![row])
        })
    }
}
