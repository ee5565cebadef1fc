//! Cache fingerprint
//!
//! A [`CacheKey`] is an ordered list of components reduced to a running hash.
//! The hash is only a fast pre-check: equality also compares the checksum,
//! the component count and every retained component, so two keys that
//! collide on the hash never match.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value;

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASHCODE: u64 = 17;

/// Order-sensitive composite key
#[derive(Debug, Clone)]
pub struct CacheKey {
    multiplier: u64,
    hashcode: u64,
    checksum: u64,
    count: u32,
    update_list: Vec<Value>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    /// Build a key from components in order
    pub fn from_components<I, V>(components: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut key = Self::new();
        key.update_all(components);
        key
    }

    /// The "no key" sentinel: a key without components
    pub fn null_key() -> Self {
        Self::new()
    }

    pub fn is_null(&self) -> bool {
        self.count == 0
    }

    /// Append one component
    pub fn update(&mut self, component: impl Into<Value>) {
        let component = component.into();
        let mut base = value_hash(&component);

        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        base = base.wrapping_mul(u64::from(self.count));
        self.hashcode = self
            .multiplier
            .wrapping_mul(self.hashcode)
            .wrapping_add(base);

        self.update_list.push(component);
    }

    pub fn update_all<I, V>(&mut self, components: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for component in components {
            self.update(component);
        }
    }

    pub fn hashcode(&self) -> u64 {
        self.hashcode
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn components(&self) -> &[Value] {
        &self.update_list
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.update_list == other.update_list
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for component in &self.update_list {
            match component {
                Value::String(s) => write!(f, ":{}", s)?,
                Value::Null => f.write_str(":null")?,
                other => write!(f, ":{}", other)?,
            }
        }
        Ok(())
    }
}

/// Deterministic hash of a component; `null` hashes to 1
fn value_hash(value: &Value) -> u64 {
    if value.is_null() {
        return 1;
    }
    let mut hasher = DefaultHasher::new();
    hash_value(value, &mut hasher);
    hasher.finish()
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => state.write_u8(0),
        Value::Bool(b) => {
            state.write_u8(1);
            b.hash(state);
        }
        Value::Number(n) => {
            state.write_u8(2);
            if let Some(i) = n.as_i64() {
                i.hash(state);
            } else if let Some(u) = n.as_u64() {
                u.hash(state);
            } else {
                n.as_f64().unwrap_or_default().to_bits().hash(state);
            }
        }
        Value::String(s) => {
            state.write_u8(3);
            s.hash(state);
        }
        Value::Array(items) => {
            state.write_u8(4);
            state.write_usize(items.len());
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(fields) => {
            state.write_u8(5);
            state.write_usize(fields.len());
            for (name, field) in fields {
                name.hash(state);
                hash_value(field, state);
            }
        }
    }
}
