//! Runtime type descriptors.
//!
//! Every DAP value type has exactly one [`TypeInfo`] for the life of the
//! process, built lazily on first reference. Descriptor pointer identity is
//! the type-equality relation used by [`Any`](crate::any::Any) and the
//! session's handler registry.

use std::any::{Any as StdAny, TypeId};
use std::fmt;
use std::mem;
use std::sync::Mutex;

use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use crate::codec::{Deserializer, Serializer};
use crate::value::DapType;

/// Type-erased storage for one DAP value.
pub type BoxedValue = Box<dyn StdAny + Send + Sync>;

type ErasedRef<'a> = &'a (dyn StdAny + Send + Sync);

/// Immutable descriptor for one DAP value type: identity, layout, and the
/// codec hooks that operate on type-erased storage.
pub struct TypeInfo {
    name: String,
    size: usize,
    alignment: usize,
    construct: fn() -> BoxedValue,
    clone: fn(ErasedRef) -> BoxedValue,
    equals: fn(ErasedRef, ErasedRef) -> bool,
    debug: fn(ErasedRef, &mut fmt::Formatter<'_>) -> fmt::Result,
    serialize: fn(&mut Serializer, ErasedRef) -> bool,
    deserialize: fn(&Deserializer<'_>) -> Option<BoxedValue>,
}

impl TypeInfo {
    /// Stable diagnostic name. Not used on the wire.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Default-constructs a value of the described type.
    pub fn construct(&self) -> BoxedValue {
        (self.construct)()
    }

    pub fn clone_value(&self, value: ErasedRef) -> BoxedValue {
        (self.clone)(value)
    }

    /// Compares two erased values of the described type.
    pub fn value_eq(&self, a: ErasedRef, b: ErasedRef) -> bool {
        (self.equals)(a, b)
    }

    pub fn fmt_value(&self, value: ErasedRef, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(value, f)
    }

    pub fn serialize(&self, s: &mut Serializer, value: ErasedRef) -> bool {
        (self.serialize)(s, value)
    }

    pub fn deserialize(&self, d: &Deserializer<'_>) -> Option<BoxedValue> {
        (self.deserialize)(d)
    }
}

/// Descriptors are singletons; identity is pointer identity.
impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for TypeInfo {}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .finish()
    }
}

fn construct_erased<T: DapType>() -> BoxedValue {
    Box::new(T::default())
}

fn clone_erased<T: DapType>(value: ErasedRef) -> BoxedValue {
    let value = value
        .downcast_ref::<T>()
        .expect("erased value does not match its descriptor");
    Box::new(value.clone())
}

fn equals_erased<T: DapType>(a: ErasedRef, b: ErasedRef) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn debug_erased<T: DapType>(value: ErasedRef, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.downcast_ref::<T>() {
        Some(value) => write!(f, "{value:?}"),
        None => write!(f, "<corrupt>"),
    }
}

fn serialize_erased<T: DapType>(s: &mut Serializer, value: ErasedRef) -> bool {
    let value = value
        .downcast_ref::<T>()
        .expect("erased value does not match its descriptor");
    value.serialize(s)
}

fn deserialize_erased<T: DapType>(d: &Deserializer<'_>) -> Option<BoxedValue> {
    T::deserialize(d).map(|v| Box::new(v) as BoxedValue)
}

lazy_static! {
    static ref REGISTRY: Mutex<FxHashMap<TypeId, &'static TypeInfo>> =
        Mutex::new(FxHashMap::default());
}

/// Returns the process-lifetime descriptor for `T`, building it on first
/// reference. Repeated calls return the same pointer.
pub fn type_info_of<T: DapType>() -> &'static TypeInfo {
    let key = TypeId::of::<T>();
    if let Some(info) = REGISTRY.lock().unwrap().get(&key).copied() {
        return info;
    }

    // Built outside the lock: computing the name may recurse into child
    // descriptors (e.g. "array<integer>").
    let built = TypeInfo {
        name: T::type_name(),
        size: mem::size_of::<T>(),
        alignment: mem::align_of::<T>(),
        construct: construct_erased::<T>,
        clone: clone_erased::<T>,
        equals: equals_erased::<T>,
        debug: debug_erased::<T>,
        serialize: serialize_erased::<T>,
        deserialize: deserialize_erased::<T>,
    };

    let mut registry = REGISTRY.lock().unwrap();
    if let Some(info) = registry.get(&key).copied() {
        return info;
    }
    let info: &'static TypeInfo = Box::leak(Box::new(built));
    registry.insert(key, info);
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_are_stable_singletons() {
        let a = type_info_of::<i64>();
        let b = type_info_of::<i64>();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a, b);
        assert_ne!(type_info_of::<i64>(), type_info_of::<bool>());
    }

    #[test]
    fn container_names_compose() {
        assert_eq!(type_info_of::<i64>().name(), "integer");
        assert_eq!(type_info_of::<Vec<i64>>().name(), "array<integer>");
        assert_eq!(
            type_info_of::<Option<Vec<String>>>().name(),
            "optional<array<string>>"
        );
    }

    #[test]
    fn erased_hooks_round_trip() {
        let info = type_info_of::<String>();
        let value: BoxedValue = Box::new(String::from("hi"));
        let copy = info.clone_value(value.as_ref());
        assert!(info.value_eq(value.as_ref(), copy.as_ref()));

        let fresh = info.construct();
        assert!(!info.value_eq(value.as_ref(), fresh.as_ref()));
        assert_eq!(info.size(), std::mem::size_of::<String>());
    }
}
