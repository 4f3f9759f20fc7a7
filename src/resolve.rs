//! Template resolution: validate, escape, splice.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::adapter::Adapter;
use crate::error::{PlainError, PlainResult};
use crate::escape::{escape, escape_static};
use crate::template::Template;
use crate::value::{ParamBag, Value};

/// Resolve `template` with `params`, escaping through `adapter`.
///
/// Scans the template on every call; use [`Template::resolve`] to reuse a
/// scanned template.
pub fn resolve(params: &ParamBag, template: &str, adapter: &dyn Adapter) -> PlainResult<String> {
    Template::new(template).resolve(params, adapter)
}

impl Template {
    /// Produce the fully escaped SQL for `params`.
    ///
    /// Fails with [`PlainError::MissingParameters`] listing every missing key,
    /// or [`PlainError::UnexpectedParameter`] for the first bag key (longest
    /// first, then insertion order) that no placeholder uses. Nothing partial is
    /// ever returned.
    pub fn resolve(&self, params: &ParamBag, adapter: &dyn Adapter) -> PlainResult<String> {
        let validation = self.validate(params)?;
        if !validation.is_valid() {
            return Err(PlainError::MissingParameters(validation.missing));
        }

        // Anonymous values, one per `:?` occurrence in order. Without any
        // `:?` in the template the `?` entry is ignored.
        let anonymous = match params.anonymous() {
            _ if self.anonymous_count() == 0 => Vec::new(),
            Some(Value::Seq(items)) => items
                .iter()
                .map(|item| escape_static("?", item, adapter))
                .collect::<PlainResult<Vec<_>>>()?,
            _ => return Err(PlainError::MissingParameters(vec!["?".to_string()])),
        };

        // Longest keys first so a key that prefixes another is never handled
        // before it; the sort is stable, so ties keep insertion order.
        let mut keys: Vec<(&str, &Value)> = params.iter().collect();
        keys.sort_by_key(|(key, _)| Reverse(key.len()));

        let mut replacements: HashMap<&str, String> = HashMap::new();
        for (key, value) in keys {
            if validation.get(key).is_none() {
                return Err(PlainError::UnexpectedParameter(key.to_string()));
            }
            for token in self.tokens() {
                let placeholder = &token.placeholder;
                if placeholder.is_anonymous()
                    || replacements.contains_key(placeholder.raw.as_str())
                    || placeholder.key() != key
                {
                    continue;
                }
                let text = escape(Some(value), placeholder, adapter)?;
                replacements.insert(placeholder.raw.as_str(), text);
            }
        }

        for key in &validation.unresolved_optional {
            for token in self.tokens() {
                if token.placeholder.key() == *key {
                    replacements.insert(token.placeholder.raw.as_str(), String::new());
                }
            }
        }

        self.splice(&anonymous, &replacements)
    }

    /// Single forward pass over the token spans. Substituted text is never
    /// scanned again.
    fn splice(&self, anonymous: &[String], replacements: &HashMap<&str, String>) -> PlainResult<String> {
        let text = self.text();
        let mut out = String::with_capacity(text.len());
        let mut anonymous = anonymous.iter();
        let mut last = 0;

        for token in self.tokens() {
            out.push_str(&text[last..token.span.start]);
            let placeholder = &token.placeholder;
            let replacement = if placeholder.is_anonymous() {
                anonymous.next()
            } else {
                replacements.get(placeholder.raw.as_str())
            };
            let replacement = replacement
                .ok_or_else(|| PlainError::MissingParameters(vec![placeholder.key()]))?;
            out.push_str(replacement);
            last = token.span.end;
        }

        out.push_str(&text[last..]);
        Ok(out)
    }
}
