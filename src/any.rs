//! A dynamically typed DAP value.

use std::fmt;
use std::ptr;

use crate::codec::{Deserializer, Serializer};
use crate::typeinfo::{type_info_of, BoxedValue, TypeInfo};
use crate::value::{DapType, Object};

/// Holds either nothing (null) or exactly one value of any registered DAP
/// type, identified by its [`TypeInfo`] descriptor.
///
/// ```
/// use dap_session::Any;
///
/// let mut v = Any::new(10i64);
/// assert!(v.is::<i64>());
/// assert_eq!(v.get::<i64>(), Some(10));
/// v.reset();
/// assert!(v.is::<()>());
/// ```
///
/// On the wire an `Any` carries no type tag: scalars, arrays, and objects
/// map to the corresponding JSON shapes, and a stored struct value encodes
/// as a plain JSON object. Decoding an untyped object therefore yields
/// [`Object`], not the struct; both peers must know the expected struct
/// type statically for struct payloads to round-trip.
pub struct Any {
    value: Option<(BoxedValue, &'static TypeInfo)>,
}

impl Any {
    /// The null value.
    pub fn null() -> Self {
        Any { value: None }
    }

    pub fn new<T: DapType>(value: T) -> Self {
        let info = type_info_of::<T>();
        if ptr::eq(info, type_info_of::<()>()) {
            return Any::null();
        }
        Any {
            value: Some((Box::new(value), info)),
        }
    }

    /// True iff the stored value is of type `T`. The null value is of type
    /// `()` and nothing else.
    pub fn is<T: DapType>(&self) -> bool {
        match &self.value {
            Some((_, info)) => ptr::eq(*info, type_info_of::<T>()),
            None => ptr::eq(type_info_of::<T>(), type_info_of::<()>()),
        }
    }

    /// A copy of the stored value, if it is of type `T`.
    pub fn get<T: DapType>(&self) -> Option<T> {
        match &self.value {
            Some((value, info)) if ptr::eq(*info, type_info_of::<T>()) => {
                value.downcast_ref::<T>().cloned()
            }
            None if ptr::eq(type_info_of::<T>(), type_info_of::<()>()) => {
                type_info_of::<T>().construct().downcast::<T>().ok().map(|v| *v)
            }
            _ => None,
        }
    }

    /// Replaces the stored value.
    pub fn set<T: DapType>(&mut self, value: T) {
        *self = Any::new(value);
    }

    /// Clears back to null.
    pub fn reset(&mut self) {
        self.value = None;
    }

    /// The descriptor of the stored value (the null descriptor when empty).
    pub fn type_info(&self) -> &'static TypeInfo {
        match &self.value {
            Some((_, info)) => info,
            None => type_info_of::<()>(),
        }
    }
}

impl Default for Any {
    fn default() -> Self {
        Any::null()
    }
}

impl Clone for Any {
    fn clone(&self) -> Self {
        Any {
            value: self
                .value
                .as_ref()
                .map(|(value, info)| (info.clone_value(value.as_ref()), *info)),
        }
    }
}

impl PartialEq for Any {
    fn eq(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (None, None) => true,
            (Some((a, ai)), Some((b, bi))) => {
                ptr::eq(*ai, *bi) && ai.value_eq(a.as_ref(), b.as_ref())
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            None => write!(f, "Any(null)"),
            Some((value, info)) => {
                write!(f, "Any({}: ", info.name())?;
                info.fmt_value(value.as_ref(), f)?;
                write!(f, ")")
            }
        }
    }
}

impl DapType for Any {
    fn type_name() -> String {
        "any".to_string()
    }

    fn serialize(&self, s: &mut Serializer) -> bool {
        match &self.value {
            None => s.null(),
            Some((value, info)) => info.serialize(s, value.as_ref()),
        }
    }

    fn deserialize(d: &Deserializer<'_>) -> Option<Self> {
        if d.is_absent() {
            return None;
        }
        if d.is_null() {
            return Some(Any::null());
        }
        if let Some(b) = d.boolean() {
            return Some(Any::new(b));
        }
        if let Some(i) = d.integer() {
            return Some(Any::new(i));
        }
        if let Some(n) = d.number() {
            return Some(Any::new(n));
        }
        if let Some(s) = d.string() {
            return Some(Any::new(s.to_string()));
        }
        if let Some(items) = Vec::<Any>::deserialize(d) {
            return Some(Any::new(items));
        }
        Object::deserialize(d).map(Any::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::dap_struct! {
        struct AnyTestObject("AnyTestObject") {
            i: i64 => "i",
            n: f64 => "n",
        }
    }

    #[test]
    fn empty_is_null_and_nothing_else() {
        let any = Any::default();
        assert!(any.is::<()>());
        assert!(!any.is::<bool>());
        assert!(!any.is::<i64>());
        assert!(!any.is::<f64>());
        assert!(!any.is::<Object>());
        assert!(!any.is::<String>());
        assert!(!any.is::<Vec<i64>>());
        assert!(!any.is::<AnyTestObject>());
        assert_eq!(any.get::<()>(), Some(()));
    }

    #[test]
    fn scalars_round_trip_through_any() {
        assert_eq!(Any::new(true).get::<bool>(), Some(true));
        assert_eq!(Any::new(10i64).get::<i64>(), Some(10));
        assert_eq!(Any::new(123.0f64).get::<f64>(), Some(123.0));
        assert_eq!(
            Any::new("hello world".to_string()).get::<String>(),
            Some("hello world".to_string())
        );
        assert_eq!(
            Any::new(vec![10i64, 20, 30]).get::<Vec<i64>>(),
            Some(vec![10, 20, 30])
        );
    }

    #[test]
    fn holds_registered_structs() {
        let any = Any::new(AnyTestObject { i: 5, n: 3.0 });
        assert!(any.is::<AnyTestObject>());
        let got = any.get::<AnyTestObject>().unwrap();
        assert_eq!(got.i, 5);
        assert_eq!(got.n, 3.0);
    }

    #[test]
    fn assignment_replaces_type_and_value() {
        let mut any = Any::default();
        any.set(10i64);
        assert!(any.is::<i64>());
        assert!(!any.is::<bool>());
        any.set(true);
        assert!(!any.is::<i64>());
        assert!(any.is::<bool>());
        any.set(AnyTestObject { i: 5, n: 3.0 });
        assert!(any.is::<AnyTestObject>());
        any.reset();
        assert!(any.is::<()>());
        assert!(!any.is::<AnyTestObject>());
    }

    #[test]
    fn equality_compares_type_then_value() {
        assert_eq!(Any::new(1i64), Any::new(1i64));
        assert_ne!(Any::new(1i64), Any::new(2i64));
        assert_ne!(Any::new(1i64), Any::new(1.0f64));
        assert_eq!(Any::null(), Any::null());
        assert_ne!(Any::null(), Any::new(false));
        assert_eq!(Any::new(1i64).clone(), Any::new(1i64));
    }

    #[test]
    fn integer_and_number_stay_distinct_on_decode() {
        let node = serde_json::json!(7);
        let any = Any::deserialize(&Deserializer::new(&node)).unwrap();
        assert!(any.is::<i64>());
        assert!(!any.is::<f64>());

        let node = serde_json::json!(7.5);
        let any = Any::deserialize(&Deserializer::new(&node)).unwrap();
        assert!(any.is::<f64>());
    }

    #[test]
    fn nested_shapes_decode_dynamically() {
        let node = serde_json::json!({ "items": [1, "two"], "flag": true });
        let any = Any::deserialize(&Deserializer::new(&node)).unwrap();
        let obj = any.get::<Object>().unwrap();
        assert!(obj["flag"].is::<bool>());
        let items = obj["items"].get::<Vec<Any>>().unwrap();
        assert!(items[0].is::<i64>());
        assert!(items[1].is::<String>());
    }
}
