//! Loading queries from `.sql` files.
//!
//! A file holds either one unnamed query, named after the file, or any
//! number of queries each introduced by a marker line:
//!
//! ```sql
//! -- name: get_by_id
//! SELECT * FROM user WHERE id = :id
//!
//! -- name: get_all
//! SELECT * FROM user
//! ```

use std::path::Path;

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0},
    combinator::eof,
    sequence::{delimited, terminated, tuple},
    IResult,
};

use crate::error::{PlainError, PlainResult};
use crate::query::Query;

/// The queries of one file, in file order.
#[derive(Debug, Clone, Default)]
pub struct Queries {
    queries: Vec<Query>,
}

impl Queries {
    /// Split `text` into queries. `file_name` names a lone unnamed query
    /// (up to its first `.`) and appears in errors.
    pub fn from_sql(text: &str, file_name: &str) -> PlainResult<Self> {
        let queries = split_queries(text, file_name)?
            .into_iter()
            .map(|(name, sql)| Query::named(name, sql))
            .collect();
        Ok(Self { queries })
    }

    pub fn get(&self, name: &str) -> Option<&Query> {
        self.queries.iter().find(|q| q.name() == Some(name))
    }

    /// Like [`Queries::get`], failing with [`PlainError::UnknownQuery`].
    pub fn require(&self, name: &str) -> PlainResult<&Query> {
        self.get(name)
            .ok_or_else(|| PlainError::UnknownQuery(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.iter().filter_map(Query::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.iter()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Read a `.sql` file and bind each of its queries.
pub fn load_queries(path: impl AsRef<Path>) -> PlainResult<Queries> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let queries = Queries::from_sql(&text, &path.to_string_lossy())?;
    tracing::debug!(path = %path.display(), count = queries.len(), "loaded queries");
    Ok(queries)
}

/// Split file text into `(name, sql)` pairs.
pub fn split_queries(text: &str, file_name: &str) -> PlainResult<Vec<(String, String)>> {
    let mut unnamed: Vec<&str> = Vec::new();
    let mut named: Vec<(String, Vec<&str>)> = Vec::new();

    for line in text.lines() {
        if let Ok((_, name)) = parse_marker(line) {
            if named.iter().any(|(n, _)| n == name) {
                return Err(PlainError::DuplicateQuery(name.to_string()));
            }
            named.push((name.to_string(), Vec::new()));
            continue;
        }
        match named.last_mut() {
            Some((_, lines)) => lines.push(line),
            None => unnamed.push(line),
        }
    }

    let leading = unnamed.join("\n").trim().to_string();
    if named.is_empty() {
        if leading.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![(default_name(file_name), leading)]);
    }
    if !leading.is_empty() {
        return Err(PlainError::ImproperlyFormattedFile {
            path: file_name.to_string(),
        });
    }

    Ok(named
        .into_iter()
        .map(|(name, lines)| (name, lines.join("\n").trim().to_string()))
        .collect())
}

/// `queries/single.sql` -> `single`
fn default_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    base.split('.').next().unwrap_or_default().to_string()
}

/// Parse a `-- name: foo` marker line.
fn parse_marker(line: &str) -> IResult<&str, &str> {
    delimited(
        tuple((space0, tag("--"), space0, tag("name"), space0, char(':'), space0)),
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-'),
        terminated(space0, eof),
    )(line.trim_end_matches('\r'))
}
