//! The value model DAP messages are built from.
//!
//! Scalars map to native Rust types (`bool`, `i64`, `f64`, `String`, `()`
//! for null), arrays to `Vec<T>`, optionals to `Option<T>`, and open
//! key/value maps to [`Object`]. Compound message types are declared with
//! the [`dap_struct!`](crate::dap_struct) family of macros, which generate
//! the [`DapType`] impl from a field table.

use rustc_hash::FxHashMap;

use crate::any::Any;
use crate::codec::{Deserializer, Serializer};

/// A mapping from string keys to dynamically typed values. Iteration order
/// is not significant.
pub type Object = FxHashMap<String, Any>;

/// A value that can travel in a DAP message.
///
/// `serialize` writes the value into the given node and reports success;
/// `deserialize` reads one from it, returning `None` on any shape mismatch.
/// Implementations are provided for all scalar and container shapes; use
/// the declaration macros for compound types rather than implementing this
/// by hand.
pub trait DapType:
    Clone + std::fmt::Debug + Default + PartialEq + Send + Sync + 'static
{
    /// Diagnostic name of the type (e.g. `"integer"`, `"array<string>"`).
    fn type_name() -> String;

    fn serialize(&self, s: &mut Serializer) -> bool;

    fn deserialize(d: &Deserializer<'_>) -> Option<Self>;
}

impl DapType for bool {
    fn type_name() -> String {
        "boolean".to_string()
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        s.boolean(*self)
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        d.boolean()
    }
}

impl DapType for i64 {
    fn type_name() -> String {
        "integer".to_string()
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        s.integer(*self)
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        d.integer()
    }
}

impl DapType for f64 {
    fn type_name() -> String {
        "number".to_string()
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        s.number(*self)
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        d.number()
    }
}

impl DapType for String {
    fn type_name() -> String {
        "string".to_string()
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        s.string(self)
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        d.string().map(str::to_string)
    }
}

/// The null type. Decoding never fails; the node's contents are irrelevant.
impl DapType for () {
    fn type_name() -> String {
        "null".to_string()
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        s.null()
    }

    fn deserialize(_: &Deserializer<'_>) -> Option<Self> {
        Some(())
    }
}

impl<T: DapType> DapType for Vec<T> {
    fn type_name() -> String {
        format!("array<{}>", T::type_name())
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        s.array(self.len(), |i, s| self[i].serialize(s))
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        let mut out = Vec::with_capacity(d.count());
        d.array(|_, d| match T::deserialize(d) {
            Some(v) => {
                out.push(v);
                true
            }
            None => false,
        })
        .then_some(out)
    }
}

/// An optional field. Absent values are elided from serialized structs, and
/// decoding treats anything the inner type rejects (a missing key, `null`,
/// a mismatched shape) as absent rather than as a failure.
impl<T: DapType> DapType for Option<T> {
    fn type_name() -> String {
        format!("optional<{}>", T::type_name())
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        match self {
            Some(v) => v.serialize(s),
            None => {
                s.remove();
                true
            }
        }
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        Some(T::deserialize(d))
    }
}

impl DapType for Object {
    fn type_name() -> String {
        "object".to_string()
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        s.object(|o| {
            for (key, value) in self {
                if !o.field(key, |s| value.serialize(s)) {
                    return false;
                }
            }
            true
        })
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        let mut out = Object::default();
        d.entries(|key, d| match Any::deserialize(d) {
            Some(v) => {
                out.insert(key.to_string(), v);
                true
            }
            None => false,
        })
        .then_some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: DapType>(value: &T) -> T {
        let mut s = Serializer::new();
        assert!(value.serialize(&mut s), "{} failed to encode", T::type_name());
        let node = s.into_value();
        T::deserialize(&Deserializer::new(&node))
            .unwrap_or_else(|| panic!("{} failed to decode {node}", T::type_name()))
    }

    #[test]
    fn scalar_roundtrips() {
        assert_eq!(roundtrip(&true), true);
        assert_eq!(roundtrip(&-42i64), -42);
        assert_eq!(roundtrip(&123.456f64), 123.456);
        assert_eq!(roundtrip(&"hello world".to_string()), "hello world");
    }

    #[test]
    fn array_roundtrip_preserves_order() {
        let v = vec![2i64, 4, 6, 8];
        assert_eq!(roundtrip(&v), v);
        let nested = vec![vec!["a".to_string()], vec![], vec!["b".to_string()]];
        assert_eq!(roundtrip(&nested), nested);
    }

    #[test]
    fn array_rejects_element_mismatch() {
        let node = serde_json::json!([1, "two", 3]);
        assert_eq!(Vec::<i64>::deserialize(&Deserializer::new(&node)), None);
    }

    #[test]
    fn optional_tolerates_null_and_absence() {
        let null = serde_json::Value::Null;
        assert_eq!(
            Option::<String>::deserialize(&Deserializer::new(&null)),
            Some(None)
        );
        assert_eq!(
            Option::<String>::deserialize(&Deserializer::absent()),
            Some(None)
        );
        assert_eq!(roundtrip(&Some(7i64)), Some(7));
    }

    #[test]
    fn optional_ordering_laws() {
        // Absent sorts before any present value; presents compare by inner.
        assert!(None::<i64> < Some(i64::MIN));
        assert!(Some(3) < Some(5));
        assert_eq!(None::<i64>, None::<i64>);
        assert_eq!(Some(5).unwrap_or(10), 5);
        assert_eq!(None.unwrap_or(10), 10);
    }

    #[test]
    fn object_roundtrip() {
        let mut obj = Object::default();
        obj.insert("one".to_string(), Any::new(1i64));
        obj.insert("two".to_string(), Any::new(2.0f64));
        obj.insert("name".to_string(), Any::new("n".to_string()));
        let decoded = roundtrip(&obj);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded["one"].get::<i64>(), Some(1));
        assert_eq!(decoded["two"].get::<f64>(), Some(2.0));
        assert_eq!(decoded["name"].get::<String>(), Some("n".to_string()));
    }
}
