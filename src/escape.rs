//! Turns a parameter value into the SQL text that replaces its placeholder.
//!
//! Scalars go through the adapter's `escape`; everything shaped (sequences,
//! records, conditions, optional fragments) is assembled here.

use crate::adapter::Adapter;
use crate::error::{PlainError, PlainResult};
use crate::resolve::resolve;
use crate::template::{Modifier, Placeholder};
use crate::value::{Condition, Record, Value};

/// Escape `value` for `placeholder`.
///
/// `None` means the bag has no value: optional placeholders render as an
/// empty string, anything else is a missing parameter.
pub fn escape(
    value: Option<&Value>,
    placeholder: &Placeholder,
    adapter: &dyn Adapter,
) -> PlainResult<String> {
    let key = placeholder.key();
    let Some(value) = value else {
        return match placeholder.modifier {
            Modifier::Optional => Ok(String::new()),
            _ => Err(PlainError::MissingParameters(vec![key])),
        };
    };

    match placeholder.modifier {
        Modifier::None => escape_static(&key, value, adapter),
        Modifier::Raw => match value {
            Value::Scalar(s) => Ok(s.to_string()),
            _ => Err(PlainError::invalid(key, "a scalar")),
        },
        Modifier::ObjectInsert => escape_object(&key, value, placeholder, adapter, ObjectStyle::Insert),
        Modifier::ObjectUpdate => escape_object(&key, value, placeholder, adapter, ObjectStyle::Update),
        Modifier::Dynamic => match value {
            Value::Condition(condition) => escape_condition(condition, adapter),
            _ => Err(PlainError::invalid(key, "a condition")),
        },
        Modifier::Optional => escape_fragment(&key, value, placeholder, adapter),
    }
}

/// A scalar, or a (possibly nested) sequence rendered as tuples.
pub fn escape_static(key: &str, value: &Value, adapter: &dyn Adapter) -> PlainResult<String> {
    match value {
        Value::Scalar(s) => Ok(adapter.escape(s)),
        Value::Seq(items) => escape_sequence(key, items, adapter, true),
        _ => Err(PlainError::invalid(key, "a scalar or a sequence")),
    }
}

/// `[1, 2]` -> `(1, 2)`. At the outermost level a sequence of tuples is not
/// wrapped again: `[[1, 2], [3, 4]]` -> `(1, 2), (3, 4)`.
fn escape_sequence(key: &str, items: &[Value], adapter: &dyn Adapter, outermost: bool) -> PlainResult<String> {
    let mut tokens = Vec::with_capacity(items.len());
    let mut nested = false;
    for item in items {
        match item {
            Value::Scalar(s) => tokens.push(adapter.escape(s)),
            Value::Seq(inner) => {
                nested = true;
                tokens.push(escape_sequence(key, inner, adapter, false)?);
            }
            _ => return Err(PlainError::invalid(key, "a sequence of scalars or sequences")),
        }
    }

    let joined = tokens.join(", ");
    if outermost && nested {
        Ok(joined)
    } else {
        Ok(format!("({})", joined))
    }
}

#[derive(Clone, Copy)]
enum ObjectStyle {
    Insert,
    Update,
}

fn escape_object(
    key: &str,
    value: &Value,
    placeholder: &Placeholder,
    adapter: &dyn Adapter,
    style: ObjectStyle,
) -> PlainResult<String> {
    let schema = placeholder.schema_keys();
    match value {
        Value::Record(record) => escape_record(key, record, schema.as_deref(), adapter, style),
        Value::Seq(_) if schema.is_none() && matches!(style, ObjectStyle::Update) => Err(
            PlainError::invalid_object(key, "a sequence of records needs a schema for updates"),
        ),
        Value::Seq(items) => {
            let rendered = items
                .iter()
                .map(|item| match item {
                    Value::Record(record) => escape_record(key, record, schema.as_deref(), adapter, style),
                    other => Err(PlainError::invalid_object(
                        key,
                        format!("expected a sequence of records, found a {}", other.kind()),
                    )),
                })
                .collect::<PlainResult<Vec<_>>>()?;
            Ok(rendered.join(", "))
        }
        other => Err(PlainError::invalid_object(
            key,
            format!("expected a record or a sequence of records, found a {}", other.kind()),
        )),
    }
}

fn escape_record(
    key: &str,
    record: &Record,
    schema: Option<&[&str]>,
    adapter: &dyn Adapter,
    style: ObjectStyle,
) -> PlainResult<String> {
    let fields: Vec<&str> = match schema {
        Some(fields) => fields.to_vec(),
        None => record.keys().collect(),
    };

    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        let value = record
            .get(field)
            .ok_or_else(|| PlainError::MissingParameters(vec![format!("{}.{}", key, field)]))?;
        let escaped = escape_static(key, value, adapter)?;
        match style {
            ObjectStyle::Insert => parts.push(escaped),
            ObjectStyle::Update => {
                let ident = adapter
                    .escape_identifier(field)
                    .ok_or(PlainError::MissingAdapter {
                        capability: "escape_identifier",
                    })?;
                parts.push(format!("{} = {}", ident, escaped));
            }
        }
    }

    Ok(match style {
        ObjectStyle::Insert => format!("({})", parts.join(", ")),
        ObjectStyle::Update => parts.join(", "),
    })
}

/// Resolve every part on its own, then join with the operator.
fn escape_condition(condition: &Condition, adapter: &dyn Adapter) -> PlainResult<String> {
    let fragments = condition
        .parts
        .iter()
        .map(|(template, params)| resolve(params, template, adapter))
        .collect::<PlainResult<Vec<_>>>()?;
    Ok(fragments.join(&format!(" {} ", condition.operator)))
}

/// Substitute the single `*` marker of an optional fragment. `*!` inserts the
/// value raw.
fn escape_fragment(
    key: &str,
    value: &Value,
    placeholder: &Placeholder,
    adapter: &dyn Adapter,
) -> PlainResult<String> {
    let malformed = || PlainError::MalformedPlaceholder {
        placeholder: placeholder.raw.clone(),
        reason: "the fragment must contain exactly one '*' marker",
    };
    let fragment = placeholder.schema.as_deref().ok_or_else(malformed)?;
    let marker = fragment.find('*').ok_or_else(malformed)?;

    let after = &fragment[marker + 1..];
    let (text, rest) = match after.strip_prefix('!') {
        Some(rest) => match value {
            Value::Scalar(s) => (s.to_string(), rest),
            _ => return Err(PlainError::invalid(key, "a scalar")),
        },
        None => (escape_static(key, value, adapter)?, after),
    };

    Ok(format!("{}{}{}", &fragment[..marker], text, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{EchoAdapter, Postgres};
    use crate::template::scan;
    use crate::value::{ParamBag, Scalar};
    use pretty_assertions::assert_eq;

    fn placeholder(text: &str) -> Placeholder {
        scan(text).remove(0).placeholder
    }

    fn echo(text: &str, value: impl Into<Value>) -> PlainResult<String> {
        escape(Some(&value.into()), &placeholder(text), &EchoAdapter)
    }

    #[test]
    fn test_scalar_uses_adapter() {
        let value = Value::from("o'neil");
        assert_eq!(escape(Some(&value), &placeholder(":name"), &Postgres).unwrap(), "'o''neil'");
    }

    #[test]
    fn test_flat_sequence() {
        assert_eq!(echo(":ids", [1, 2, 3, 4]).unwrap(), "(1, 2, 3, 4)");
    }

    #[test]
    fn test_nested_sequence() {
        let rows = vec![vec!["john", "doe"], vec!["foo", "bar"]];
        assert_eq!(echo(":users", rows).unwrap(), "(john, doe), (foo, bar)");
    }

    #[test]
    fn test_deeply_nested_sequence() {
        let value = Value::Seq(vec![Value::from([Value::from(1), Value::from([2, 3])])]);
        assert_eq!(echo(":v", value).unwrap(), "(1, (2, 3))");
    }

    #[test]
    fn test_record_under_plain_modifier_is_rejected() {
        let err = echo(":user", Record::new().with("a", 1)).unwrap_err();
        assert!(matches!(err, PlainError::InvalidParameter { .. }));
    }

    #[test]
    fn test_raw_is_verbatim() {
        let value = Value::from("users; --");
        assert_eq!(escape(Some(&value), &placeholder(":!table"), &Postgres).unwrap(), "users; --");
    }

    #[test]
    fn test_object_insert_follows_schema_order() {
        let user = Record::new().with("surname", "doe").with("name", "john");
        assert_eq!(echo(":$user{name,surname}", user.clone()).unwrap(), "(john, doe)");
        assert_eq!(echo(":$user", user).unwrap(), "(doe, john)");
    }

    #[test]
    fn test_object_insert_many() {
        let users = vec![
            Record::new().with("name", "john"),
            Record::new().with("name", "foo"),
        ];
        assert_eq!(echo(":$users{name}", users).unwrap(), "(john), (foo)");
    }

    #[test]
    fn test_object_update() {
        let user = Record::new().with("name", "john").with("age", 40);
        assert_eq!(echo(":@user{name}", user.clone()).unwrap(), "name = john");
        assert_eq!(echo(":@user", user).unwrap(), "name = john, age = 40");
    }

    #[test]
    fn test_object_update_quotes_identifiers() {
        let user = Value::from(Record::new().with("order", 2));
        assert_eq!(
            escape(Some(&user), &placeholder(":@user"), &Postgres).unwrap(),
            "\"order\" = 2"
        );
    }

    #[test]
    fn test_schemaless_update_over_sequence_is_rejected() {
        let users = vec![Record::new().with("name", "john")];
        let err = echo(":@users", users).unwrap_err();
        assert!(matches!(err, PlainError::InvalidObjectParameter { .. }));
    }

    #[test]
    fn test_condition_joins_parts() {
        let condition = Condition::and()
            .part("id = :id", ParamBag::new().set("id", 1))
            .part("name = :name", ParamBag::new().set("name", "john"));
        assert_eq!(echo(":~where", condition).unwrap(), "id = 1 AND name = john");
    }

    #[test]
    fn test_condition_part_errors_propagate() {
        let condition = Condition::or().part("id = :id", ParamBag::new());
        let err = echo(":~where", condition).unwrap_err();
        assert!(matches!(err, PlainError::MissingParameters(ref keys) if keys == &["id"]));
    }

    #[test]
    fn test_fragment_escaped_and_raw() {
        let value = Value::from("name");
        assert_eq!(
            escape(Some(&value), &placeholder(":*sort{ORDER BY *}"), &Postgres).unwrap(),
            "ORDER BY 'name'"
        );
        assert_eq!(
            escape(Some(&value), &placeholder(":*sort{ORDER BY *! DESC}"), &Postgres).unwrap(),
            "ORDER BY name DESC"
        );
    }

    #[test]
    fn test_absent_optional_is_empty() {
        assert_eq!(escape(None, &placeholder(":*limit{LIMIT *}"), &EchoAdapter).unwrap(), "");
        let err = escape(None, &placeholder(":id"), &EchoAdapter).unwrap_err();
        assert!(matches!(err, PlainError::MissingParameters(_)));
    }

    #[test]
    fn test_null_scalar() {
        let value = Value::Scalar(Scalar::Null);
        assert_eq!(escape(Some(&value), &placeholder(":v"), &Postgres).unwrap(), "NULL");
    }
}
