//! Argument map sub-codec.
//!
//! Several packet bodies embed a comma-separated list of `key:value` tokens.
//! Decoding rewrites device-side keys into their semantic names and infers a
//! type for every value; encoding writes entries back in insertion order.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A typed argument value.
///
/// Wire inference only recognises unsigned numbers, so a negative `Int` or
/// `Float` encodes fine but decodes back as `Str` (`-5` stays the string
/// `"-5"`). Values that must survive a round trip typed are non-negative.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ArgValue {
    /// Infers the type of a raw wire value.
    ///
    /// All-digit values become integers, digits with exactly one decimal point
    /// become floats, `true`/`false` become booleans and everything else is
    /// kept as a string.
    pub fn infer(raw: &str) -> Self {
        if is_digits(raw) {
            if let Ok(n) = raw.parse() {
                return ArgValue::Int(n);
            }
        } else if let Some((whole, frac)) = raw.split_once('.') {
            if is_digits(whole) && is_digits(frac) {
                if let Ok(f) = raw.parse() {
                    return ArgValue::Float(f);
                }
            }
        } else if raw == "true" || raw == "false" {
            return ArgValue::Bool(raw == "true");
        }
        ArgValue::Str(raw.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Int(n) => Some(*n as f64),
            ArgValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Renders the value the way it appears on the wire.
impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(n) => write!(f, "{}", n),
            ArgValue::Float(v) => write!(f, "{:.6}", v),
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(v.into())
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        ArgValue::Int(v.into())
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Insertion-ordered key → value mapping.
///
/// Re-inserting an existing key replaces its value in place, keeping the
/// original position.
#[derive(Debug, Clone, Default)]
pub struct ArgumentMap {
    keys: Vec<String>,
    values: HashMap<String, ArgValue>,
}

impl ArgumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a raw argument list.
    ///
    /// Tokens without a `:` are skipped; an empty list yields an empty map.
    pub fn parse(raw: &str) -> Self {
        let mut map = Self::new();
        if raw.is_empty() {
            return map;
        }

        for token in raw.split(',') {
            let Some((key, value)) = token.split_once(':') else {
                continue;
            };
            map.insert(normalize_key(key), ArgValue::infer(value));
        }
        map
    }

    /// Encodes the map as `key:value` tokens joined by `,`.
    pub fn encode(&self) -> String {
        self.iter()
            .map(|(key, value)| format!("{}:{}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Inserts a value, returning the previous one if the key existed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Option<ArgValue> {
        let key = key.into();
        let value = value.into();
        match self.values.insert(key.clone(), value) {
            Some(previous) => Some(previous),
            None => {
                self.keys.push(key);
                None
            }
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<ArgValue> {
        let value = self.values.remove(key)?;
        self.keys.retain(|k| k != key);
        Some(value)
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.keys
            .iter()
            .filter_map(|key| self.values.get(key).map(|value| (key.as_str(), value)))
    }
}

/// Order-sensitive: two maps with the same entries in a different order differ.
impl PartialEq for ArgumentMap {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.values == other.values
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for ArgumentMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for ArgumentMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Rewrites `<prefix><index><suffix>` into `<target_prefix><index><target_suffix>`.
struct IndexedRule {
    prefix: &'static str,
    suffix: &'static str,
    target_prefix: &'static str,
    target_suffix: &'static str,
}

impl IndexedRule {
    const fn new(
        prefix: &'static str,
        suffix: &'static str,
        target_prefix: &'static str,
        target_suffix: &'static str,
    ) -> Self {
        Self {
            prefix,
            suffix,
            target_prefix,
            target_suffix,
        }
    }

    fn apply(&self, key: &str) -> Option<String> {
        let index = key.strip_prefix(self.prefix)?.strip_suffix(self.suffix)?;
        if !is_digits(index) {
            return None;
        }
        Some(format!("{}{}{}", self.target_prefix, index, self.target_suffix))
    }
}

const INDEXED_RULES: &[IndexedRule] = &[
    // GPIO lines
    IndexedRule::new("io", ".di", "gpio.", ".digital.input"),
    IndexedRule::new("io", ".do", "gpio.", ".digital.output"),
    IndexedRule::new("io", ".ai", "gpio.", ".analog.input"),
    IndexedRule::new("io", ".ao", "gpio.", ".analog.output"),
    IndexedRule::new("io", ".counter", "gpio.", ".event.count"),
    // BLE sensor channels
    IndexedRule::new("ble.", ".id", "ble.", ".mac.address"),
    IndexedRule::new("ble.", ".hum", "ble.", ".humidity"),
    IndexedRule::new("ble.", ".tempc", "ble.", ".temperature.celsius"),
    IndexedRule::new("ble.", ".tempf", "ble.", ".temperature.fahrenheit"),
    IndexedRule::new("ble.", ".model_id", "ble.", ".model.id"),
    IndexedRule::new("ble.", ".batt", "ble.", ".battery.level"),
    IndexedRule::new("ble.", ".lux", "ble.", ".light.lux"),
    IndexedRule::new("ble.", ".volt", "ble.", ".voltage"),
    IndexedRule::new("ble.", ".rpm", "ble.", ".rpm"),
    IndexedRule::new("ble.", ".press", "ble.", ".pressure"),
    IndexedRule::new("ble.", ".counter", "ble.", ".event.count"),
    IndexedRule::new("ble.", ".x_acc", "ble.", ".acceleration.x"),
    IndexedRule::new("ble.", ".y_acc", "ble.", ".acceleration.y"),
    IndexedRule::new("ble.", ".z_acc", "ble.", ".acceleration.z"),
    IndexedRule::new("ble.", ".msg_count", "ble.", ".message.count"),
    IndexedRule::new("ble.", ".msg", "ble.", ".message.content"),
    IndexedRule::new("ble.", ".mag_counter", "ble.", ".magnetometer.count"),
    IndexedRule::new("ble.", ".mag_data", "ble.", ".magnetometer.data"),
    IndexedRule::new("ble.", ".rssi", "ble.", ".rssi"),
];

const LITERAL_RULES: &[(&str, &str)] = &[
    ("report", "report.code"),
    ("confiot_ble", "ble.confiot.connection.status"),
    ("confiot_serial", "serial.confiot.connection.status"),
];

/// Maps a device-side key to its semantic name. Unmatched keys pass through.
pub fn normalize_key(key: &str) -> String {
    INDEXED_RULES
        .iter()
        .find_map(|rule| rule.apply(key))
        .or_else(|| {
            LITERAL_RULES
                .iter()
                .find(|(from, _)| *from == key)
                .map(|(_, to)| to.to_string())
        })
        .unwrap_or_else(|| key.to_string())
}
