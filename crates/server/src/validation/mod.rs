//! Input validation for the auth endpoints.
//!
//! Rules follow the usual web-form conventions: inputs are trimmed, an empty
//! value only ever fails `required`, and every other rule is skipped for it.
//! Messages are stored as catalog keys and translated when the error is
//! rendered, so handlers never need to know the request locale.

use crate::lang::{Locale, trans};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$",
    )
    .expect("EMAIL_REGEX is a valid regex pattern")
});

/// Maximum allowed email length (RFC 5321).
const MAX_EMAIL_LENGTH: usize = 254;

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LENGTH && EMAIL_REGEX.is_match(email)
}

/// A not yet translated validation message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub key: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl Message {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    fn translate(&self, locale: &Locale, field: &str) -> String {
        let attribute = field.replace('_', " ");
        let mut replacements: Vec<(&str, &str)> = vec![("attribute", attribute.as_str())];
        replacements.extend(self.params.iter().map(|(k, v)| (*k, v.as_str())));
        trans(locale, self.key, &replacements)
    }
}

/// Field errors collected for one request, in the order they were found.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationErrors {
    fields: Vec<(String, Vec<Message>)>,
    message: Option<&'static str>,
    data: Option<Value>,
    headline_only: bool,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single failed field.
    pub fn field(field: &str, message: Message) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: Message) {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, messages)) => messages.push(message),
            None => self.fields.push((field.to_string(), vec![message])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.data.is_none()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }

    /// Replace the headline message (defaults to `validation.verify_prompt`).
    pub fn with_message(mut self, key: &'static str) -> Self {
        self.message = Some(key);
        self
    }

    /// Replace the field list with a fixed payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Report the first field message as the headline and drop the field list.
    pub fn headline_only(mut self) -> Self {
        self.headline_only = true;
        self
    }

    pub fn is_headline_only(&self) -> bool {
        self.headline_only
    }

    pub fn message_key(&self) -> &'static str {
        self.message.unwrap_or("validation.verify_prompt")
    }

    /// Translated top-level message.
    pub fn headline(&self, locale: &Locale) -> String {
        if self.headline_only
            && let Some((field, messages)) = self.fields.first()
            && let Some(first) = messages.first()
        {
            return first.translate(locale, field);
        }
        trans(locale, self.message_key(), &[])
    }

    /// Translated `data` payload: `[{field, message}]` where a field with a
    /// single message carries it as a string and otherwise as a list.
    pub fn render_data(&self, locale: &Locale) -> Value {
        if let Some(data) = &self.data {
            return data.clone();
        }
        let entries = self
            .fields
            .iter()
            .map(|(field, messages)| {
                let mut translated: Vec<String> = messages
                    .iter()
                    .map(|m| m.translate(locale, field))
                    .collect();
                let message = if translated.len() == 1 {
                    Value::String(translated.remove(0))
                } else {
                    json!(translated)
                };
                json!({ "field": field, "message": message })
            })
            .collect();
        Value::Array(entries)
    }
}

/// Collects rule failures across fields.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<'a>(&'a mut self, name: &'a str, value: Option<&'a str>) -> FieldRules<'a> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        FieldRules {
            errors: &mut self.errors,
            name,
            value,
        }
    }

    pub fn fail(&mut self, field: &str, message: Message) {
        self.errors.add(field, message);
    }

    pub fn passes(&self, field: &str) -> bool {
        !self.errors.has(field)
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Rule chain for a single field.
pub struct FieldRules<'a> {
    errors: &'a mut ValidationErrors,
    name: &'a str,
    value: Option<&'a str>,
}

impl FieldRules<'_> {
    pub fn required(self) -> Self {
        if self.value.is_none() {
            self.errors.add(self.name, Message::new("validation.required"));
        }
        self
    }

    pub fn email(self) -> Self {
        if let Some(value) = self.value
            && !is_valid_email(value)
        {
            self.errors.add(self.name, Message::new("validation.email"));
        }
        self
    }

    pub fn min(self, min: usize) -> Self {
        if let Some(value) = self.value
            && value.chars().count() < min
        {
            self.errors
                .add(self.name, Message::new("validation.min.string").param("min", min));
        }
        self
    }

    pub fn max(self, max: usize) -> Self {
        if let Some(value) = self.value
            && value.chars().count() > max
        {
            self.errors
                .add(self.name, Message::new("validation.max.string").param("max", max));
        }
        self
    }

    /// `<field>_confirmation` must repeat the value.
    pub fn confirmed(self, confirmation: Option<&str>) -> Self {
        if let Some(value) = self.value
            && confirmation.map(str::trim) != Some(value)
        {
            self.errors.add(self.name, Message::new("validation.confirmed"));
        }
        self
    }
}
