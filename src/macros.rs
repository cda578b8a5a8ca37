//! Declaration macros for compound DAP types.
//!
//! [`dap_struct!`](crate::dap_struct) declares a plain message structure
//! from a field table; [`dap_request!`](crate::dap_request) and
//! [`dap_event!`](crate::dap_event) additionally wire the type into the
//! session's command/event routing; [`dap_variant!`](crate::dap_variant)
//! declares a discriminated union whose decode probes alternatives in
//! declaration order.

/// Declares a struct that can travel in DAP messages.
///
/// ```
/// dap_session::dap_struct! {
///     /// A breakpoint location.
///     pub struct Breakpoint("breakpoint") {
///         verified: bool => "verified",
///         line: Option<i64> => "line",
///     }
/// }
/// ```
///
/// The parenthesised literal is the type's diagnostic name; each field
/// maps a Rust field to its wire key. Absent `Option` fields are omitted
/// from the serialized object and tolerated as missing on input; unknown
/// input keys are ignored.
#[macro_export]
macro_rules! dap_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ( $wire:literal ) {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty => $fname:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::value::DapType for $name {
            fn type_name() -> ::std::string::String {
                $wire.to_string()
            }

            fn serialize(&self, s: &mut $crate::codec::Serializer) -> bool {
                s.object(|o| {
                    $(
                        if !o.field($fname, |s| {
                            $crate::value::DapType::serialize(&self.$field, s)
                        }) {
                            return false;
                        }
                    )*
                    let _ = &o;
                    true
                })
            }

            fn deserialize(d: &$crate::codec::Deserializer<'_>) -> ::std::option::Option<Self> {
                #[allow(unused_mut)]
                let mut out = <Self as ::std::default::Default>::default();
                $(
                    if !d.field($fname, |d| {
                        match <$ty as $crate::value::DapType>::deserialize(d) {
                            ::std::option::Option::Some(v) => {
                                out.$field = v;
                                true
                            }
                            ::std::option::Option::None => false,
                        }
                    }) {
                        return ::std::option::Option::None;
                    }
                )*
                let _ = &d;
                ::std::option::Option::Some(out)
            }
        }
    };
}

/// Declares a request structure and binds it to a command string and its
/// response type.
///
/// ```
/// dap_session::dap_struct! {
///     pub struct AddResponse("addResponse") { sum: i64 => "sum" }
/// }
/// dap_session::dap_request! {
///     pub struct AddRequest("add") -> AddResponse {
///         a: i64 => "a",
///         b: i64 => "b",
///     }
/// }
/// ```
#[macro_export]
macro_rules! dap_request {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ( $command:literal ) -> $resp:ty {
            $($fields:tt)*
        }
    ) => {
        $crate::dap_struct! {
            $(#[$meta])*
            $vis struct $name($command) { $($fields)* }
        }

        impl $crate::session::Request for $name {
            const COMMAND: &'static str = $command;
            type Response = $resp;
        }
    };
}

/// Declares an event structure and binds it to an event name.
#[macro_export]
macro_rules! dap_event {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ( $event:literal ) {
            $($fields:tt)*
        }
    ) => {
        $crate::dap_struct! {
            $(#[$meta])*
            $vis struct $name($event) { $($fields)* }
        }

        impl $crate::session::Event for $name {
            const EVENT: &'static str = $event;
        }
    };
}

/// Declares a discriminated union over the listed alternatives.
///
/// Decoding probes alternatives in declaration order against the same
/// node and the first success wins, so order earlier alternatives to be
/// strict refinements of later ones (e.g. `i64` before `f64`). The first
/// alternative is the `Default`.
#[macro_export]
macro_rules! dap_variant {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $first:ident ( $first_ty:ty )
            $(, $rest:ident ( $rest_ty:ty ) )* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis enum $name {
            $first($first_ty),
            $( $rest($rest_ty), )*
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                $name::$first(::std::default::Default::default())
            }
        }

        impl $crate::value::DapType for $name {
            fn type_name() -> ::std::string::String {
                "variant".to_string()
            }

            fn serialize(&self, s: &mut $crate::codec::Serializer) -> bool {
                match self {
                    $name::$first(v) => $crate::value::DapType::serialize(v, s),
                    $( $name::$rest(v) => $crate::value::DapType::serialize(v, s), )*
                }
            }

            fn deserialize(d: &$crate::codec::Deserializer<'_>) -> ::std::option::Option<Self> {
                if let ::std::option::Option::Some(v) =
                    <$first_ty as $crate::value::DapType>::deserialize(d)
                {
                    return ::std::option::Option::Some($name::$first(v));
                }
                $(
                    if let ::std::option::Option::Some(v) =
                        <$rest_ty as $crate::value::DapType>::deserialize(d)
                    {
                        return ::std::option::Option::Some($name::$rest(v));
                    }
                )*
                ::std::option::Option::None
            }
        }
    };
}
