#[doc(hidden)]
pub use crate::{
    any::Any,
    codec::{Deserializer, FieldSerializer, Serializer},
    errors::{Error, SessionError},
    framing::{ContentReader, ContentWriter},
    future::ResponseFuture,
    io::{pipe, Pipe, Reader, ReaderWriter, Writer},
    session::{Event, Request, Session},
    typeinfo::{type_info_of, TypeInfo},
    value::{DapType, Object},
};
