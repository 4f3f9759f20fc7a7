//! Parameter values and the parameter bag.
//!
//! A [`ParamBag`] maps placeholder keys (`id`, `$user`, `~filters`, ...) to
//! [`Value`]s. Keys keep their insertion order; the resolver relies on it to
//! break ties between keys of equal length.

use std::fmt;

use crate::error::{PlainError, PlainResult};

/// A single literal handed to the adapter's `escape`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Renders the scalar verbatim, without any quoting.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    /// Ordered sequence, possibly nested.
    Seq(Vec<Value>),
    Record(Record),
    /// Only valid under the `~` modifier.
    Condition(Condition),
}

impl Value {
    /// Shorthand for a NULL value.
    pub fn null() -> Self {
        Value::Scalar(Scalar::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Seq(_) => "sequence",
            Value::Record(_) => "record",
            Value::Condition(_) => "condition",
        }
    }
}

/// An insertion-ordered set of `key -> value` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Drives the `~` modifier: every part is resolved on its own, then the
/// fragments are joined with ` <operator> `.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub operator: String,
    pub parts: Vec<(String, ParamBag)>,
}

impl Condition {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            parts: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new("AND")
    }

    pub fn or() -> Self {
        Self::new("OR")
    }

    /// Append a sub-template with its own parameters.
    pub fn part(mut self, template: impl Into<String>, params: ParamBag) -> Self {
        self.parts.push((template.into(), params));
        self
    }

    /// Read `{"operator": "AND", "parts": [["sql", {...}], ...]}`.
    pub fn from_json(name: &str, json: serde_json::Value) -> PlainResult<Self> {
        let serde_json::Value::Object(mut obj) = json else {
            return Err(PlainError::invalid(name, "a condition object"));
        };
        let operator = match obj.remove("operator") {
            Some(serde_json::Value::String(op)) => op,
            _ => return Err(PlainError::invalid(name, "a string 'operator'")),
        };
        let parts = match obj.remove("parts") {
            Some(serde_json::Value::Array(parts)) => parts,
            _ => return Err(PlainError::invalid(name, "a 'parts' array")),
        };

        let mut condition = Condition::new(operator);
        for part in parts {
            let serde_json::Value::Array(pair) = part else {
                return Err(PlainError::invalid(name, "parts as [sql, params] pairs"));
            };
            let mut pair = pair.into_iter();
            let (Some(serde_json::Value::String(sql)), params, None) =
                (pair.next(), pair.next(), pair.next())
            else {
                return Err(PlainError::invalid(name, "parts as [sql, params] pairs"));
            };
            let params = match params {
                Some(json) => ParamBag::from_json(json)?,
                None => ParamBag::new(),
            };
            condition.parts.push((sql, params));
        }
        Ok(condition)
    }
}

/// Caller-supplied values keyed by placeholder key (`modifier + name`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamBag {
    entries: Vec<(String, Value)>,
    anonymous: Option<Value>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ParamBag::insert`].
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set the values for the `:?` placeholders, in order.
    pub fn positional<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.anonymous = Some(Value::Seq(values.into_iter().map(Into::into).collect()));
        self
    }

    /// Insert a value under its full key. The key `?` sets the anonymous list.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if key == "?" {
            self.anonymous = Some(value);
            return;
        }
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        if key == "?" {
            return self.anonymous.as_ref();
        }
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The `?` entry, if any.
    pub fn anonymous(&self) -> Option<&Value> {
        self.anonymous.as_ref()
    }

    /// Named entries in insertion order. Does not include `?`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.anonymous.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a bag from a JSON object.
    ///
    /// Keys starting with `~` are read as conditions; every other object
    /// becomes a [`Record`].
    pub fn from_json(json: serde_json::Value) -> PlainResult<Self> {
        let serde_json::Value::Object(obj) = json else {
            return Err(PlainError::Json("parameters must be a JSON object".into()));
        };
        let mut bag = ParamBag::new();
        for (key, value) in obj {
            if key.starts_with('~') {
                let condition = Condition::from_json(&key, value)?;
                bag.insert(key, Value::Condition(condition));
            } else {
                bag.insert(key, Value::from(value));
            }
        }
        Ok(bag)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParamBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = ParamBag::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

macro_rules! scalar_from {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from($v: $ty) -> Self {
                    $body
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

scalar_from! {
    bool => |v| Scalar::Bool(v),
    i8 => |v| Scalar::Int(v.into()),
    i16 => |v| Scalar::Int(v.into()),
    i32 => |v| Scalar::Int(v.into()),
    i64 => |v| Scalar::Int(v),
    u8 => |v| Scalar::Int(v.into()),
    u16 => |v| Scalar::Int(v.into()),
    u32 => |v| Scalar::Int(v.into()),
    // past i64::MAX the digits travel as text rather than lose precision
    u64 => |v| i64::try_from(v).map(Scalar::Int).unwrap_or_else(|_| Scalar::Text(v.to_string())),
    usize => |v| i64::try_from(v).map(Scalar::Int).unwrap_or_else(|_| Scalar::Text(v.to_string())),
    isize => |v| i64::try_from(v).map(Scalar::Int).unwrap_or_else(|_| Scalar::Text(v.to_string())),
    f32 => |v| Scalar::Float(v.into()),
    f64 => |v| Scalar::Float(v),
    &str => |v| Scalar::Text(v.to_string()),
    String => |v| Scalar::Text(v),
    &String => |v| Scalar::Text(v.clone()),
    char => |v| Scalar::Text(v.to_string()),
    chrono::NaiveDate => |v| Scalar::Text(v.format("%Y-%m-%d").to_string()),
    chrono::NaiveTime => |v| Scalar::Text(v.format("%H:%M:%S%.f").to_string()),
    chrono::NaiveDateTime => |v| Scalar::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    chrono::DateTime<chrono::Utc> => |v| Scalar::Text(v.to_rfc3339()),
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<Condition> for Value {
    fn from(c: Condition) -> Self {
        Value::Condition(c)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or_else(Value::null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::null(),
            serde_json::Value::Bool(b) => b.into(),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => i.into(),
                (None, Some(u)) => u.into(),
                _ => n.as_f64().map(Value::from).unwrap_or_else(Value::null),
            },
            serde_json::Value::String(s) => s.into(),
            serde_json::Value::Array(items) => items.into(),
            serde_json::Value::Object(obj) => Value::Record(obj.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_keeps_insertion_order() {
        let record = Record::new()
            .with("surname", "doe")
            .with("name", "john")
            .with("surname", "roe");
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["surname", "name"]);
        assert_eq!(record.get("surname"), Some(&Value::from("roe")));
    }

    #[test]
    fn test_question_mark_key_sets_anonymous() {
        let bag = ParamBag::new().set("?", [1, 2]).set("id", 3);
        assert_eq!(bag.anonymous(), Some(&Value::from([1, 2])));
        assert_eq!(bag.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_from_json_objects() {
        let bag = ParamBag::from_json(json!({
            "id": 7,
            "ratio": 0.5,
            "$user": {"name": "john", "surname": "doe"},
            "ids": [1, 2],
            "?": ["a"],
        }))
        .unwrap();

        assert_eq!(bag.get("id"), Some(&Value::from(7)));
        assert_eq!(bag.get("ratio"), Some(&Value::from(0.5)));
        let user = bag.get("$user").and_then(Value::as_record).unwrap();
        assert_eq!(user.keys().collect::<Vec<_>>(), vec!["name", "surname"]);
        assert_eq!(bag.get("ids"), Some(&Value::from([1, 2])));
        assert_eq!(bag.anonymous(), Some(&Value::from(["a"])));
    }

    #[test]
    fn test_from_json_condition() {
        let bag = ParamBag::from_json(json!({
            "~where": {
                "operator": "OR",
                "parts": [["id = :id", {"id": 1}], ["deleted IS NULL"]]
            }
        }))
        .unwrap();

        let expected = Condition::or()
            .part("id = :id", ParamBag::new().set("id", 1))
            .part("deleted IS NULL", ParamBag::new());
        assert_eq!(bag.get("~where"), Some(&Value::Condition(expected)));
    }

    #[test]
    fn test_from_json_rejects_bad_condition() {
        let err = ParamBag::from_json(json!({"~where": {"parts": []}})).unwrap_err();
        assert!(matches!(err, PlainError::InvalidParameter { .. }));
    }

    #[test]
    fn test_chrono_values_render_as_text() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Scalar::from(date), Scalar::Text("2024-02-29".into()));
    }

    #[test]
    fn test_large_unsigned_integers_keep_every_digit() {
        assert_eq!(Value::from(7u64), Value::Scalar(Scalar::Int(7)));
        assert_eq!(Value::from(3usize), Value::Scalar(Scalar::Int(3)));
        assert_eq!(
            Value::from(u64::MAX),
            Value::Scalar(Scalar::Text("18446744073709551615".into()))
        );
        assert_eq!(
            Value::from(json!(18446744073709551615u64)),
            Value::Scalar(Scalar::Text("18446744073709551615".into()))
        );
        assert_eq!(Value::from(json!(1.5)), Value::Scalar(Scalar::Float(1.5)));
    }

    #[test]
    fn test_option_none_is_null() {
        let v: Value = Option::<i32>::None.into();
        assert_eq!(v, Value::null());
    }
}
