//! Placeholder grammar and parameter validation, using nom.
//!
//! # Syntax Overview
//!
//! ```text
//! :?                    anonymous, filled in order from the `?` list
//! :name                 escaped value
//! :!name                raw value, inserted verbatim
//! :~name                condition, sub-templates joined by an operator
//! :$name{k1,k2}         object insert   -> (v1, v2)
//! :@name{k1,k2}         object update   -> k1 = v1, k2 = v2
//! :*name{LIMIT *}       optional fragment, erased when the value is absent
//! ```
//!
//! A `::` run (type casts such as `'1'::int`) never starts a placeholder.

use std::ops::Range;

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{anychar, char},
    combinator::{map_opt, opt},
    sequence::delimited,
    IResult,
};

use crate::error::{PlainError, PlainResult};
use crate::value::{ParamBag, Value};

/// Selects how a placeholder's value is escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// `:name`
    None,
    /// `:!name`
    Raw,
    /// `:~name`
    Dynamic,
    /// `:$name`
    ObjectInsert,
    /// `:@name`
    ObjectUpdate,
    /// `:*name{...}`
    Optional,
}

impl Modifier {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '!' => Some(Modifier::Raw),
            '~' => Some(Modifier::Dynamic),
            '$' => Some(Modifier::ObjectInsert),
            '@' => Some(Modifier::ObjectUpdate),
            '*' => Some(Modifier::Optional),
            _ => None,
        }
    }

    /// The prefix this modifier adds to a parameter key.
    pub fn symbol(self) -> &'static str {
        match self {
            Modifier::None => "",
            Modifier::Raw => "!",
            Modifier::Dynamic => "~",
            Modifier::ObjectInsert => "$",
            Modifier::ObjectUpdate => "@",
            Modifier::Optional => "*",
        }
    }

    /// Whether a `{...}` block after the name belongs to the placeholder.
    pub fn takes_schema(self) -> bool {
        matches!(
            self,
            Modifier::ObjectInsert | Modifier::ObjectUpdate | Modifier::Optional
        )
    }

    pub fn is_object(self) -> bool {
        matches!(self, Modifier::ObjectInsert | Modifier::ObjectUpdate)
    }
}

/// One placeholder occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    /// Exact matched text, e.g. `:$user{name,surname}`.
    pub raw: String,
    pub modifier: Modifier,
    /// Identifier, or `?` for anonymous placeholders.
    pub name: String,
    /// Text between the braces: a key list, or the optional fragment.
    pub schema: Option<String>,
}

impl Placeholder {
    /// The parameter bag key: `modifier + name`.
    pub fn key(&self) -> String {
        format!("{}{}", self.modifier.symbol(), self.name)
    }

    pub fn is_anonymous(&self) -> bool {
        self.name == "?"
    }

    /// Schema keys, trimmed, in declaration order.
    pub fn schema_keys(&self) -> Option<Vec<&str>> {
        self.schema.as_deref().map(|schema| {
            schema
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .collect()
        })
    }
}

/// A placeholder and its byte span in the template.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub span: Range<usize>,
    pub placeholder: Placeholder,
}

/// An immutable SQL template, scanned once.
///
/// The token list is read-only, so one `Template` can be resolved from any
/// number of threads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    text: String,
    tokens: Vec<Token>,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = scan(&text);
        Self { text, tokens }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder occurrences in template order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of `:?` occurrences.
    pub fn anonymous_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| t.placeholder.is_anonymous())
            .count()
    }

    /// Check `bag` against what the template demands.
    ///
    /// Missing values are collected rather than reported one at a time; the
    /// caller decides what to do with [`Validation::missing`]. Shape errors
    /// that make the check itself impossible (an object placeholder with a
    /// schema receiving a scalar, a malformed optional fragment) fail at once:
    /// placeholders after the offending one are not examined, so their missing
    /// keys are not part of that error.
    pub fn validate(&self, bag: &ParamBag) -> PlainResult<Validation<'_>> {
        let mut validation = Validation {
            missing: Vec::new(),
            unresolved_optional: Vec::new(),
            placeholders: Vec::new(),
        };

        let anonymous = self.anonymous_count();
        if anonymous > 0 {
            let matches = matches!(bag.anonymous(), Some(Value::Seq(items)) if items.len() == anonymous);
            if !matches {
                validation.missing.push("?".to_string());
            }
        }

        for token in self.tokens.iter().filter(|t| !t.placeholder.is_anonymous()) {
            let placeholder = &token.placeholder;
            let key = placeholder.key();

            if placeholder.modifier == Modifier::Optional {
                check_fragment(placeholder)?;
            }

            match bag.get(&key) {
                None if placeholder.modifier == Modifier::Optional => {
                    push_unique(&mut validation.unresolved_optional, &key);
                }
                None => push_unique(&mut validation.missing, &key),
                Some(value) if placeholder.modifier.is_object() => {
                    if let Some(keys) = placeholder.schema_keys() {
                        check_schema(&key, value, &keys, &mut validation.missing)?;
                    }
                }
                Some(_) => {}
            }

            if validation.get(&key).is_none() {
                validation.placeholders.push((key, placeholder));
            }
        }

        Ok(validation)
    }
}

/// Outcome of [`Template::validate`].
#[derive(Debug)]
pub struct Validation<'t> {
    /// Keys with no value, including `?` and `name.key` schema entries.
    pub missing: Vec<String>,
    /// Optional keys with no value; their fragments are erased.
    pub unresolved_optional: Vec<String>,
    /// Key to first placeholder with that key, in template order.
    pub placeholders: Vec<(String, &'t Placeholder)>,
}

impl<'t> Validation<'t> {
    pub fn get(&self, key: &str) -> Option<&'t Placeholder> {
        self.placeholders
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| *p)
    }

    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, entry: &str) {
    if !list.iter().any(|e| e == entry) {
        list.push(entry.to_string());
    }
}

/// Every record (or every record in a sequence) must carry every schema key.
fn check_schema(key: &str, value: &Value, keys: &[&str], missing: &mut Vec<String>) -> PlainResult<()> {
    let records = match value {
        Value::Record(record) => vec![record],
        Value::Seq(items) => items
            .iter()
            .map(|item| {
                item.as_record().ok_or_else(|| {
                    PlainError::invalid_object(
                        key,
                        format!("expected a sequence of records, found a {}", item.kind()),
                    )
                })
            })
            .collect::<PlainResult<Vec<_>>>()?,
        other => {
            return Err(PlainError::invalid_object(
                key,
                format!("expected a record or a sequence of records, found a {}", other.kind()),
            ));
        }
    };

    for record in records {
        for field in keys {
            if record.get(field).is_none() {
                push_unique(missing, &format!("{}.{}", key, field));
            }
        }
    }
    Ok(())
}

fn check_fragment(placeholder: &Placeholder) -> PlainResult<()> {
    let reason = match placeholder.schema.as_deref() {
        None => "optional placeholders need a {fragment}",
        Some(fragment) if fragment.matches('*').count() != 1 => {
            "the fragment must contain exactly one '*' marker"
        }
        Some(_) => return Ok(()),
    };
    Err(PlainError::MalformedPlaceholder {
        placeholder: placeholder.raw.clone(),
        reason,
    })
}

/// Find every placeholder in `text`, left to right.
pub fn scan(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(':') {
        let start = pos + offset;
        let rest = &text[start..];

        if rest.starts_with("::") {
            pos = start + (rest.len() - rest.trim_start_matches(':').len());
            continue;
        }

        match parse_placeholder(rest) {
            Ok((remaining, (modifier, name, schema))) => {
                let end = text.len() - remaining.len();
                tokens.push(Token {
                    span: start..end,
                    placeholder: Placeholder {
                        raw: text[start..end].to_string(),
                        modifier,
                        name: name.to_string(),
                        schema: schema.map(str::to_string),
                    },
                });
                pos = end;
            }
            Err(_) => pos = start + 1,
        }
    }

    tokens
}

type Parsed<'a> = (Modifier, &'a str, Option<&'a str>);

/// Parse one placeholder starting at a `:`.
fn parse_placeholder(input: &str) -> IResult<&str, Parsed<'_>> {
    let (input, _) = char(':')(input)?;
    if let Ok((input, _)) = char::<_, nom::error::Error<&str>>('?')(input) {
        return Ok((input, (Modifier::None, "?", None)));
    }

    let (input, modifier) = opt(parse_modifier)(input)?;
    let modifier = modifier.unwrap_or(Modifier::None);
    let (input, name) = parse_identifier(input)?;
    let (input, schema) = if modifier.takes_schema() {
        opt(parse_schema)(input)?
    } else {
        (input, None)
    };

    Ok((input, (modifier, name, schema)))
}

fn parse_modifier(input: &str) -> IResult<&str, Modifier> {
    map_opt(anychar, Modifier::from_char)(input)
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn parse_schema(input: &str) -> IResult<&str, &str> {
    delimited(char('{'), take_while(|c| c != '}'), char('}'))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    fn keys(text: &str) -> Vec<String> {
        scan(text).iter().map(|t| t.placeholder.key()).collect()
    }

    #[test]
    fn test_scan_modifiers() {
        assert_eq!(
            keys("SELECT :a, :!b, :~c, :$d, :@e, :*f{LIMIT *}, :?"),
            vec!["a", "!b", "~c", "$d", "@e", "*f", "?"]
        );
    }

    #[test]
    fn test_scan_spans_and_schema() {
        let tokens = scan("INSERT INTO user VALUES :$user{name, surname}");
        assert_eq!(tokens.len(), 1);
        let token = &tokens[0];
        assert_eq!(token.span, 24..45);
        assert_eq!(token.placeholder.raw, ":$user{name, surname}");
        assert_eq!(token.placeholder.schema_keys(), Some(vec!["name", "surname"]));
    }

    #[test]
    fn test_scan_skips_type_casts() {
        assert_eq!(keys("SELECT '1'::int, :id::text, x:::y"), vec!["id"]);
    }

    #[test]
    fn test_scan_ignores_bare_colons() {
        assert!(keys("SELECT ': ', :~ , :$").is_empty());
    }

    #[test]
    fn test_plain_placeholder_leaves_braces_alone() {
        let tokens = scan("SELECT :id{x}");
        assert_eq!(tokens[0].placeholder.raw, ":id");
        assert_eq!(tokens[0].placeholder.schema, None);
    }

    #[test]
    fn test_unclosed_schema_is_not_consumed() {
        let tokens = scan("VALUES :$user{name");
        assert_eq!(tokens[0].placeholder.raw, ":$user");
        assert_eq!(tokens[0].placeholder.schema, None);
    }

    #[test]
    fn test_validate_collects_every_missing_key() {
        let template = Template::new("WHERE id = :id AND rights = :rights AND x = :? AND id = :id");
        let validation = template.validate(&ParamBag::new()).unwrap();
        assert_eq!(validation.missing, vec!["?", "id", "rights"]);
    }

    #[test]
    fn test_validate_anonymous_count() {
        let template = Template::new("id = :? AND rights = :?");
        let short = ParamBag::new().positional([1]);
        assert_eq!(template.validate(&short).unwrap().missing, vec!["?"]);
        let exact = ParamBag::new().positional([1, 2]);
        assert!(template.validate(&exact).unwrap().is_valid());
    }

    #[test]
    fn test_validate_optional_is_not_missing() {
        let template = Template::new("ORDER BY id :*limit{LIMIT *}");
        let validation = template.validate(&ParamBag::new()).unwrap();
        assert!(validation.is_valid());
        assert_eq!(validation.unresolved_optional, vec!["*limit"]);
    }

    #[test]
    fn test_validate_schema_keys_per_record() {
        let template = Template::new("VALUES :$users{name,surname}");
        let bag = ParamBag::new().set(
            "$users",
            vec![
                Record::new().with("name", "john").with("surname", "doe"),
                Record::new().with("name", "foo"),
            ],
        );
        let validation = template.validate(&bag).unwrap();
        assert_eq!(validation.missing, vec!["$users.surname"]);
    }

    #[test]
    fn test_validate_rejects_scalar_object() {
        let template = Template::new("VALUES :$user{name}");
        let err = template
            .validate(&ParamBag::new().set("$user", "john"))
            .unwrap_err();
        assert!(matches!(err, PlainError::InvalidObjectParameter { .. }));
    }

    #[test]
    fn test_validate_shape_error_stops_the_scan() {
        let template = Template::new("VALUES :$user{name} WHERE id = :id");
        let err = template
            .validate(&ParamBag::new().set("$user", vec![1, 2]))
            .unwrap_err();
        match err {
            PlainError::InvalidObjectParameter { name, .. } => assert_eq!(name, "$user"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_fragment_without_marker() {
        let template = Template::new("ORDER BY id :*limit{LIMIT 10}");
        let err = template.validate(&ParamBag::new()).unwrap_err();
        assert!(matches!(err, PlainError::MalformedPlaceholder { .. }));
    }

    #[test]
    fn test_validate_records_first_placeholder_per_key() {
        let template = Template::new(":a :b :a");
        let bag = ParamBag::new().set("a", 1).set("b", 2);
        let validation = template.validate(&bag).unwrap();
        let found: Vec<&str> = validation.placeholders.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(found, vec!["a", "b"]);
        assert_eq!(validation.get("a").map(|p| p.raw.as_str()), Some(":a"));
    }
}
