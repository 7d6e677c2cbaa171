//! Property encoding shared by the item text format.
//!
//! Every item is written as `key: value` lines. Values are single-line: line
//! breaks and backslashes are escaped, timestamps use ISO 8601 in UTC with
//! millisecond precision, booleans are `0`/`1` and absent references are empty.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{Error, Result};

use super::ItemId;

/// Collects properties in a stable order for serialization.
#[derive(Debug, Default)]
pub struct FieldWriter {
    fields: Vec<(&'static str, String)>,
}

impl FieldWriter {
    pub fn text(&mut self, key: &'static str, value: &str) {
        self.fields.push((key, escape(value)));
    }

    pub fn id(&mut self, key: &'static str, value: &ItemId) {
        self.fields.push((key, value.as_str()));
    }

    pub fn opt_id(&mut self, key: &'static str, value: Option<&ItemId>) {
        self.fields
            .push((key, value.map(ItemId::as_str).unwrap_or_default()));
    }

    pub fn time(&mut self, key: &'static str, value: i64) {
        self.fields.push((key, format_time(value)));
    }

    pub fn flag(&mut self, key: &'static str, value: bool) {
        self.fields.push((key, if value { "1" } else { "0" }.to_string()));
    }

    pub fn int(&mut self, key: &'static str, value: i64) {
        self.fields.push((key, value.to_string()));
    }

    pub(crate) fn into_lines(self) -> impl Iterator<Item = String> {
        self.fields
            .into_iter()
            .map(|(key, value)| format!("{key}: {value}"))
    }
}

/// Read access to parsed properties.
///
/// Unknown keys are kept but ignored by the models, so a remote written by a
/// newer client with extra properties still loads.
#[derive(Debug, Default)]
pub struct FieldReader {
    values: HashMap<String, String>,
}

impl FieldReader {
    pub(crate) fn insert(&mut self, key: String, value: String) {
        self.values.insert(key, value);
    }

    pub(crate) fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn text(&self, key: &str) -> String {
        self.raw(key).map(unescape).unwrap_or_default()
    }

    pub fn id(&self, key: &str) -> Result<ItemId> {
        self.opt_id(key)?
            .ok_or_else(|| Error::Unserialize(format!("missing required property: {key}")))
    }

    pub fn opt_id(&self, key: &str) -> Result<Option<ItemId>> {
        match self.raw(key).map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| Error::Unserialize(format!("invalid id for {key}: {value}"))),
        }
    }

    pub fn time(&self, key: &str) -> Result<i64> {
        self.raw(key).map_or(Ok(0), parse_time)
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.raw(key).map(str::trim), Some("1" | "true"))
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        match self.raw(key).map(str::trim) {
            None | Some("") => Ok(0),
            Some(value) => value
                .parse()
                .map_err(|_| Error::Unserialize(format!("invalid integer for {key}: {value}"))),
        }
    }
}

/// Format a unix millisecond timestamp for the text format.
pub fn format_time(ms: i64) -> String {
    if ms <= 0 {
        return String::new();
    }
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Parse a timestamp written by [`format_time`]; empty means zero.
pub fn parse_time(value: &str) -> Result<i64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.timestamp_millis())
        .map_err(|error| Error::Unserialize(format!("invalid timestamp {value}: {error}")))
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

fn unescape(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('r') => output.push('\r'),
            Some(other) => output.push(other),
            None => output.push('\\'),
        }
    }
    output
}
