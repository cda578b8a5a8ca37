//! A role-symmetric Debug Adapter Protocol endpoint runtime.
//!
//! The same [`Session`] serves either side of a DAP conversation, whether
//! debugger client or debug adapter. Message types are declared once with the
//! [`dap_struct!`]/[`dap_request!`]/[`dap_event!`] macros and from then on
//! travel fully typed: [`Session::send`] returns a future for the matching
//! response, registered handlers receive decoded requests and events, and
//! all JSON and `Content-Length` framing stays inside the crate.
//!
//! ```
//! use dap_session::{pipe, Session};
//!
//! dap_session::dap_struct! {
//!     pub struct AddResponse("addResponse") { sum: i64 => "sum" }
//! }
//! dap_session::dap_request! {
//!     pub struct Add("add") -> AddResponse { a: i64 => "a", b: i64 => "b" }
//! }
//!
//! let a_to_b = pipe();
//! let b_to_a = pipe();
//!
//! let mut adapter = Session::create();
//! adapter.on_request(|req: &Add| Ok(AddResponse { sum: req.a + req.b }));
//! adapter.bind(a_to_b.clone(), b_to_a.clone());
//!
//! let mut client = Session::create();
//! client.bind(b_to_a, a_to_b);
//!
//! let response = client.send(&Add { a: 2, b: 3 }).wait().unwrap();
//! assert_eq!(response.sum, 5);
//! ```
//!
//! The transport is any blocking [`Reader`]/[`Writer`] pair; [`pipe`]
//! provides the in-memory one used above. Sockets and OS pipes live outside
//! this crate.

pub mod any;
pub mod codec;
pub mod errors;
pub mod framing;
pub mod future;
pub mod io;

#[doc(hidden)]
mod macros;
pub mod prelude;
pub mod session;
pub mod typeinfo;
pub mod value;

pub use any::Any;
pub use errors::{Error, SessionError};
pub use future::ResponseFuture;
pub use io::{pipe, Pipe, Reader, ReaderWriter, Writer};
pub use session::{Event, Request, Session};
pub use typeinfo::{type_info_of, TypeInfo};
pub use value::{DapType, Object};
