//! Bridges [`TypeInfo`](crate::typeinfo::TypeInfo)-described values to and
//! from a JSON document tree.
//!
//! A [`Serializer`] owns the `serde_json::Value` node it is building; a
//! [`Deserializer`] borrows an immutable one. Struct fields are written
//! through a [`FieldSerializer`], which drops keys whose child serializer
//! called [`Serializer::remove`], which is how absent optionals are elided
//! from the output.

use serde_json::{Map, Number, Value};

/// Builds a single JSON node.
#[derive(Debug, Default)]
pub struct Serializer {
    node: Value,
    removed: bool,
}

impl Serializer {
    pub fn new() -> Self {
        Serializer {
            node: Value::Null,
            removed: false,
        }
    }

    /// The finished node.
    pub fn into_value(self) -> Value {
        self.node
    }

    pub fn boolean(&mut self, v: bool) -> bool {
        self.node = Value::Bool(v);
        true
    }

    pub fn integer(&mut self, v: i64) -> bool {
        self.node = Value::from(v);
        true
    }

    /// Fails for values JSON cannot represent (NaN, infinities).
    pub fn number(&mut self, v: f64) -> bool {
        match Number::from_f64(v) {
            Some(n) => {
                self.node = Value::Number(n);
                true
            }
            None => false,
        }
    }

    pub fn string(&mut self, v: &str) -> bool {
        self.node = Value::String(v.to_string());
        true
    }

    pub fn null(&mut self) -> bool {
        self.node = Value::Null;
        true
    }

    /// Writes an array of `count` elements, invoking `f` once per index with
    /// a serializer for that element.
    pub fn array(&mut self, count: usize, mut f: impl FnMut(usize, &mut Serializer) -> bool) -> bool {
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let mut s = Serializer::new();
            if !f(i, &mut s) {
                return false;
            }
            items.push(s.node);
        }
        self.node = Value::Array(items);
        true
    }

    /// Writes an object through a [`FieldSerializer`].
    pub fn object(&mut self, f: impl FnOnce(&mut FieldSerializer) -> bool) -> bool {
        let mut fields = FieldSerializer {
            fields: Map::new(),
        };
        if !f(&mut fields) {
            return false;
        }
        self.node = Value::Object(fields.fields);
        true
    }

    /// Marks the node just written as elided. The enclosing
    /// [`FieldSerializer::field`] will drop the key entirely.
    pub fn remove(&mut self) {
        self.removed = true;
    }
}

/// Writes the fields of a JSON object one key at a time.
#[derive(Debug)]
pub struct FieldSerializer {
    fields: Map<String, Value>,
}

impl FieldSerializer {
    pub fn field(&mut self, name: &str, f: impl FnOnce(&mut Serializer) -> bool) -> bool {
        let mut s = Serializer::new();
        if !f(&mut s) {
            return false;
        }
        if !s.removed {
            self.fields.insert(name.to_string(), s.node);
        }
        true
    }
}

/// Reads a single JSON node.
///
/// The *absent* deserializer ([`Deserializer::absent`]) stands in for a
/// missing object key: every scalar read fails, `count()` is zero, and
/// nested reads fail. Callbacks can use it to detect absence or fall back
/// to defaults without special-casing missing keys.
#[derive(Debug, Clone, Copy)]
pub struct Deserializer<'a> {
    node: Option<&'a Value>,
}

impl<'a> Deserializer<'a> {
    pub fn new(node: &'a Value) -> Self {
        Deserializer { node: Some(node) }
    }

    pub fn absent() -> Deserializer<'static> {
        Deserializer { node: None }
    }

    pub fn is_absent(&self) -> bool {
        self.node.is_none()
    }

    pub fn boolean(&self) -> Option<bool> {
        self.node?.as_bool()
    }

    /// Succeeds only for JSON numbers with no fractional part.
    pub fn integer(&self) -> Option<i64> {
        self.node?.as_i64()
    }

    /// Accepts any JSON number.
    pub fn number(&self) -> Option<f64> {
        self.node?.as_f64()
    }

    pub fn string(&self) -> Option<&'a str> {
        self.node?.as_str()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.node, Some(Value::Null))
    }

    /// Element or key count; zero for scalars and for the absent deserializer.
    pub fn count(&self) -> usize {
        match self.node {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        }
    }

    /// Iterates array elements, short-circuiting on the first failure.
    pub fn array(&self, mut f: impl FnMut(usize, &Deserializer) -> bool) -> bool {
        let Some(Value::Array(items)) = self.node else {
            return false;
        };
        for (i, item) in items.iter().enumerate() {
            if !f(i, &Deserializer::new(item)) {
                return false;
            }
        }
        true
    }

    /// Hands `f` a deserializer over the named key, or the absent
    /// deserializer when the key is missing. Fails for non-object nodes.
    pub fn field(&self, name: &str, f: impl FnOnce(&Deserializer) -> bool) -> bool {
        let Some(Value::Object(map)) = self.node else {
            return false;
        };
        match map.get(name) {
            Some(v) => f(&Deserializer::new(v)),
            None => f(&Deserializer::absent()),
        }
    }

    /// Visits every key of an object node.
    pub fn entries(&self, mut f: impl FnMut(&str, &Deserializer) -> bool) -> bool {
        let Some(Value::Object(map)) = self.node else {
            return false;
        };
        for (key, value) in map {
            if !f(key, &Deserializer::new(value)) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_reads_are_strict() {
        let v = json!(2.5);
        let d = Deserializer::new(&v);
        assert_eq!(d.integer(), None);
        assert_eq!(d.number(), Some(2.5));

        let v = json!(7);
        let d = Deserializer::new(&v);
        assert_eq!(d.integer(), Some(7));
        assert_eq!(d.number(), Some(7.0));
        assert_eq!(d.boolean(), None);
        assert_eq!(d.string(), None);
    }

    #[test]
    fn float_with_zero_fraction_is_not_an_integer() {
        let v: Value = serde_json::from_str("2.0").unwrap();
        let d = Deserializer::new(&v);
        assert_eq!(d.integer(), None);
        assert_eq!(d.number(), Some(2.0));
    }

    #[test]
    fn integer_emitted_without_decimal_point() {
        let mut s = Serializer::new();
        assert!(s.integer(5));
        assert_eq!(s.into_value().to_string(), "5");

        let mut s = Serializer::new();
        assert!(s.number(5.0));
        assert_eq!(s.into_value().to_string(), "5.0");
    }

    #[test]
    fn nan_is_rejected() {
        let mut s = Serializer::new();
        assert!(!s.number(f64::NAN));
    }

    #[test]
    fn absent_deserializer_fails_everything() {
        let d = Deserializer::absent();
        assert_eq!(d.boolean(), None);
        assert_eq!(d.integer(), None);
        assert_eq!(d.number(), None);
        assert_eq!(d.string(), None);
        assert_eq!(d.count(), 0);
        assert!(!d.array(|_, _| true));
        assert!(!d.field("x", |_| true));
        assert!(!d.is_null());
    }

    #[test]
    fn missing_field_sees_absent_deserializer() {
        let v = json!({ "present": 1 });
        let d = Deserializer::new(&v);
        let mut saw_absent = false;
        assert!(d.field("missing", |d| {
            saw_absent = d.is_absent();
            true
        }));
        assert!(saw_absent);
        assert!(d.field("present", |d| d.integer() == Some(1)));
    }

    #[test]
    fn removed_field_is_dropped() {
        let mut s = Serializer::new();
        assert!(s.object(|o| {
            o.field("kept", |s| s.integer(1))
                && o.field("elided", |s| {
                    s.remove();
                    true
                })
        }));
        assert_eq!(s.into_value(), json!({ "kept": 1 }));
    }

    #[test]
    fn array_roundtrip() {
        let mut s = Serializer::new();
        let src = [10i64, 20, 30];
        assert!(s.array(src.len(), |i, s| s.integer(src[i])));
        let v = s.into_value();

        let d = Deserializer::new(&v);
        let mut out = Vec::new();
        assert!(d.array(|_, d| match d.integer() {
            Some(n) => {
                out.push(n);
                true
            }
            None => false,
        }));
        assert_eq!(out, vec![10, 20, 30]);
    }
}
