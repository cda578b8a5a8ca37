//! The session engine: a role-symmetric DAP endpoint.
//!
//! A [`Session`] multiplexes one bidirectional conversation: it correlates
//! outgoing requests with incoming responses, dispatches incoming requests
//! to registered handlers, routes events, and owns the background thread
//! that pumps the framed transport.
//!
//! General usage:
//! 1. construct with [`Session::create`],
//! 2. optionally install an error observer with [`Session::on_error`],
//! 3. register request/event handlers,
//! 4. attach the transport with [`Session::bind`],
//! 5. exchange messages with [`Session::send`] / [`Session::send_event`].
//!
//! Handlers run on the session's single pump thread, one at a time. A
//! handler must not block on a response from its own session, because the thread
//! that would deliver it is the one blocked. Futures detect that case and
//! fail fast; sending requests without waiting, or sending events, is fine
//! from any thread including handlers.

use std::any::Any as StdAny;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{Deserializer, Serializer};
use crate::errors::{Error, SessionError};
use crate::framing::{ContentReader, ContentWriter};
use crate::future::{response_channel, ResponseFuture};
use crate::io::{Reader, ReaderWriter, Writer};
use crate::typeinfo::{type_info_of, BoxedValue, TypeInfo};
use crate::value::DapType;

/// A message type that travels as a DAP request.
///
/// Declared with [`dap_request!`](crate::dap_request); the struct's fields
/// are the request's `arguments`.
pub trait Request: DapType {
    /// The `command` string this request is routed by.
    const COMMAND: &'static str;
    /// The message type of the matching response `body`.
    type Response: DapType;
}

/// A message type that travels as a DAP event.
///
/// Declared with [`dap_event!`](crate::dap_event); the struct's fields are
/// the event's `body`.
pub trait Event: DapType {
    /// The `event` string this event is routed by.
    const EVENT: &'static str;
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

/// One incoming message of any kind; classified by `type`.
#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    seq: i64,
    #[serde(rename = "type")]
    kind: String,
    command: Option<String>,
    arguments: Option<Value>,
    request_seq: Option<i64>,
    success: Option<bool>,
    message: Option<String>,
    event: Option<String>,
    body: Option<Value>,
}

#[derive(Debug, Serialize)]
struct OutgoingRequest<'a> {
    seq: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    command: &'a str,
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct OutgoingResponse<'a> {
    seq: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    request_seq: i64,
    success: bool,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

#[derive(Debug, Serialize)]
struct OutgoingEvent<'a> {
    seq: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    event: &'a str,
    body: Value,
}

// ---------------------------------------------------------------------------
// Handler registry
// ---------------------------------------------------------------------------

type ErasedValueRef<'a> = &'a (dyn StdAny + Send + Sync);

enum HandlerOutcome {
    Response(BoxedValue),
    Error(Error),
    BadArguments,
}

struct RequestHandlerEntry {
    response_info: &'static TypeInfo,
    invoke: Box<dyn Fn(&Deserializer<'_>) -> HandlerOutcome + Send + Sync>,
}

type EventHandlerEntry = dyn Fn(&Deserializer<'_>) -> bool + Send + Sync;
type SentHandlerEntry = dyn Fn(Result<ErasedValueRef<'_>, &Error>) + Send + Sync;
type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct HandlerRegistry {
    requests: FxHashMap<&'static str, Arc<RequestHandlerEntry>>,
    events: FxHashMap<&'static str, Arc<EventHandlerEntry>>,
    response_sent: FxHashMap<&'static str, Arc<SentHandlerEntry>>,
}

type PendingResolver = Box<dyn for<'a> FnOnce(Result<Option<&'a Value>, Error>) + Send>;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

const UNBOUND: u8 = 0;
const BOUND: u8 = 1;
const CLOSED: u8 = 2;

/// A DAP endpoint. See the [module docs](self) for the lifecycle.
pub struct Session {
    inner: Arc<SessionInner>,
    pump: Option<JoinHandle<()>>,
}

struct SessionInner {
    next_seq: AtomicI64,
    state: AtomicU8,
    writer: Mutex<Option<ContentWriter>>,
    reader: Mutex<Option<Arc<dyn Reader>>>,
    handlers: Mutex<HandlerRegistry>,
    pending: Mutex<FxHashMap<i64, PendingResolver>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    pump_thread: Mutex<Option<ThreadId>>,
}

impl Session {
    /// Constructs an unbound session.
    pub fn create() -> Self {
        Session {
            inner: Arc::new(SessionInner {
                next_seq: AtomicI64::new(1),
                state: AtomicU8::new(UNBOUND),
                writer: Mutex::new(None),
                reader: Mutex::new(None),
                handlers: Mutex::new(HandlerRegistry::default()),
                pending: Mutex::new(FxHashMap::default()),
                error_handler: Mutex::new(None),
                pump_thread: Mutex::new(None),
            }),
            pump: None,
        }
    }

    /// Installs (or replaces) the protocol error observer.
    ///
    /// It fires for malformed incoming JSON, unframeable bytes, unknown
    /// request commands, orphan responses, and once when the session
    /// terminally closes. None of those except the close abort the session.
    pub fn on_error(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        *self.inner.error_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Registers the handler for `R`'s command. An incoming request of that
    /// command is decoded, handed to `handler` on the pump thread, and the
    /// returned response (or error) is sent back with the caller's `seq` as
    /// `request_seq`.
    ///
    /// Registration after [`bind`](Self::bind) is allowed but not
    /// retroactive for requests already read off the wire.
    pub fn on_request<R, F>(&self, handler: F)
    where
        R: Request,
        F: Fn(&R) -> Result<R::Response, Error> + Send + Sync + 'static,
    {
        let entry = RequestHandlerEntry {
            response_info: type_info_of::<R::Response>(),
            invoke: Box::new(move |d| match R::deserialize(d) {
                Some(request) => match handler(&request) {
                    Ok(response) => HandlerOutcome::Response(Box::new(response)),
                    Err(error) => HandlerOutcome::Error(error),
                },
                None => HandlerOutcome::BadArguments,
            }),
        };
        self.inner
            .handlers
            .lock()
            .unwrap()
            .requests
            .insert(R::COMMAND, Arc::new(entry));
    }

    /// Registers the handler for `E`'s event name. Events nobody registered
    /// for are dropped silently.
    pub fn on_event<E, F>(&self, handler: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let entry: Arc<EventHandlerEntry> = Arc::new(move |d| match E::deserialize(d) {
            Some(event) => {
                handler(&event);
                true
            }
            None => false,
        });
        self.inner
            .handlers
            .lock()
            .unwrap()
            .events
            .insert(E::EVENT, entry);
    }

    /// Registers an observer fired after this endpoint has flushed a
    /// response to `R`'s command, with the response (or error) that went
    /// out on the wire.
    pub fn on_response_sent<R, F>(&self, handler: F)
    where
        R: Request,
        F: Fn(&Result<R::Response, Error>) + Send + Sync + 'static,
    {
        let entry: Arc<SentHandlerEntry> =
            Arc::new(move |outcome: Result<ErasedValueRef<'_>, &Error>| match outcome {
                Ok(erased) => {
                    if let Some(response) = erased.downcast_ref::<R::Response>() {
                        handler(&Ok(response.clone()));
                    }
                }
                Err(error) => handler(&Err(error.clone())),
            });
        self.inner
            .handlers
            .lock()
            .unwrap()
            .response_sent
            .insert(R::COMMAND, entry);
    }

    /// Sends a request to the peer. The returned future resolves when the
    /// matching response arrives, or with an error if the session closes
    /// first; after close, new sends fail immediately.
    pub fn send<R: Request>(&self, request: &R) -> ResponseFuture<R::Response> {
        let pump_thread = *self.inner.pump_thread.lock().unwrap();
        let (sink, future) = response_channel(pump_thread);

        let mut s = Serializer::new();
        if !request.serialize(&mut s) {
            sink.resolve(Err(Error::new("failed to serialize request arguments")));
            return future;
        }

        let resolver: PendingResolver = Box::new(move |outcome: Result<Option<&Value>, Error>| {
            let result = match outcome {
                Ok(body) => {
                    let d = match body {
                        Some(v) => Deserializer::new(v),
                        None => Deserializer::absent(),
                    };
                    match <R::Response as DapType>::deserialize(&d) {
                        Some(response) => Ok(response),
                        None => Err(Error::new("failed to deserialize response body")),
                    }
                }
                Err(error) => Err(error),
            };
            sink.resolve(result);
        });
        self.inner.send_request(R::COMMAND, s.into_value(), resolver);
        future
    }

    /// Sends an event to the peer. Fire-and-forget: delivery failures are
    /// logged, and a transport failure closes the session.
    pub fn send_event<E: Event>(&self, event: &E) {
        let mut s = Serializer::new();
        if !event.serialize(&mut s) {
            tracing::warn!(event = E::EVENT, "failed to serialize event body; dropping");
            return;
        }
        self.inner.send_event(E::EVENT, s.into_value());
    }

    /// Attaches the transport and starts the read pump. A second call
    /// reports [`SessionError::AlreadyBound`] and does nothing.
    pub fn bind(&mut self, reader: Arc<dyn Reader>, writer: Arc<dyn Writer>) {
        if self
            .inner
            .state
            .compare_exchange(UNBOUND, BOUND, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.inner.report(&SessionError::AlreadyBound.to_string());
            return;
        }
        *self.inner.writer.lock().unwrap() = Some(ContentWriter::new(writer));
        *self.inner.reader.lock().unwrap() = Some(Arc::clone(&reader));

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("dap-session".to_string())
            .spawn(move || read_pump(inner, ContentReader::new(reader)))
            .expect("failed to spawn session read pump");
        *self.inner.pump_thread.lock().unwrap() = Some(handle.thread().id());
        self.pump = Some(handle);
    }

    /// [`bind`](Self::bind) with both halves of one transport.
    pub fn bind_rw<T: ReaderWriter + 'static>(&mut self, rw: Arc<T>) {
        let reader: Arc<dyn Reader> = Arc::clone(&rw) as Arc<dyn Reader>;
        let writer: Arc<dyn Writer> = rw;
        self.bind(reader, writer);
    }

    /// Closes the transport and resolves every pending future with an
    /// error. Idempotent; also performed on drop.
    pub fn close(&self) {
        self.inner.shutdown(&SessionError::Closed.to_string());
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::create()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.shutdown(&SessionError::Closed.to_string());
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Read pump
// ---------------------------------------------------------------------------

fn read_pump(inner: Arc<SessionInner>, mut content: ContentReader) {
    loop {
        let Some(payload) = content.read() else { break };
        let skipped = content.take_skipped();
        if skipped > 0 {
            inner.report(&SessionError::Unframeable(skipped).to_string());
        }
        inner.process(&payload);
        if inner.is_closed() {
            break;
        }
    }
    let skipped = content.take_skipped();
    if skipped > 0 && !inner.is_closed() {
        inner.report(&SessionError::Unframeable(skipped).to_string());
    }
    inner.shutdown(&SessionError::Closed.to_string());
}

impl SessionInner {
    fn is_closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CLOSED
    }

    /// The error a send fails with when no transport is usable.
    fn unavailable(&self) -> Error {
        if self.is_closed() {
            SessionError::Closed.into()
        } else {
            SessionError::NotBound.into()
        }
    }

    fn report(&self, message: &str) {
        tracing::debug!("session error: {message}");
        let handler = self.error_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    fn process(&self, payload: &[u8]) {
        let msg: IncomingMessage = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.report(&SessionError::MalformedMessage(e).to_string());
                return;
            }
        };
        tracing::trace!(kind = %msg.kind, seq = msg.seq, "dispatching message");
        match msg.kind.as_str() {
            "request" => self.process_request(&msg),
            "response" => self.process_response(&msg),
            "event" => self.process_event(&msg),
            other => {
                self.report(&SessionError::UnknownMessageType(other.to_string()).to_string())
            }
        }
    }

    fn process_request(&self, msg: &IncomingMessage) {
        let Some(command) = msg.command.as_deref() else {
            self.report(&SessionError::MissingCommand.to_string());
            return;
        };
        let entry = self.handlers.lock().unwrap().requests.get(command).cloned();
        let Some(entry) = entry else {
            self.report(&SessionError::UnknownCommand(command.to_string()).to_string());
            self.write_response(msg.seq, command, Err(&Error::new("no handler registered")));
            return;
        };

        let outcome = match msg.arguments.as_ref() {
            Some(v) => (entry.invoke)(&Deserializer::new(v)),
            None => (entry.invoke)(&Deserializer::absent()),
        };
        match outcome {
            HandlerOutcome::Response(response) => {
                let mut s = Serializer::new();
                if !entry.response_info.serialize(&mut s, response.as_ref()) {
                    let error = Error::new("failed to serialize response body");
                    if self.write_response(msg.seq, command, Err(&error)) {
                        self.notify_sent(command, Err(&error));
                    }
                    return;
                }
                if self.write_response(msg.seq, command, Ok(s.into_value())) {
                    self.notify_sent(command, Ok(response.as_ref()));
                }
            }
            HandlerOutcome::Error(error) => {
                if self.write_response(msg.seq, command, Err(&error)) {
                    self.notify_sent(command, Err(&error));
                }
            }
            HandlerOutcome::BadArguments => {
                let error = Error::new("failed to deserialize request arguments");
                if self.write_response(msg.seq, command, Err(&error)) {
                    self.notify_sent(command, Err(&error));
                }
            }
        }
    }

    fn process_response(&self, msg: &IncomingMessage) {
        let Some(request_seq) = msg.request_seq else {
            self.report(&SessionError::MissingRequestSeq.to_string());
            return;
        };
        let resolver = self.pending.lock().unwrap().remove(&request_seq);
        let Some(resolver) = resolver else {
            self.report(&SessionError::OrphanResponse(request_seq).to_string());
            return;
        };
        if msg.success.unwrap_or(false) {
            resolver(Ok(msg.body.as_ref()));
        } else {
            let message = msg
                .message
                .clone()
                .unwrap_or_else(|| "request failed".to_string());
            resolver(Err(Error::new(message)));
        }
    }

    fn process_event(&self, msg: &IncomingMessage) {
        let Some(name) = msg.event.as_deref() else {
            tracing::warn!("dropping event without a name");
            return;
        };
        let handler = self.handlers.lock().unwrap().events.get(name).cloned();
        let Some(handler) = handler else {
            tracing::trace!(event = name, "no handler registered; dropping event");
            return;
        };
        let decoded = match msg.body.as_ref() {
            Some(v) => handler(&Deserializer::new(v)),
            None => handler(&Deserializer::absent()),
        };
        if !decoded {
            tracing::warn!(event = name, "failed to deserialize event body; dropping");
        }
    }

    fn notify_sent(&self, command: &str, outcome: Result<ErasedValueRef<'_>, &Error>) {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .response_sent
            .get(command)
            .cloned();
        if let Some(handler) = handler {
            handler(outcome);
        }
    }

    /// Writes a request envelope, registering the pending resolver under
    /// the same lock so the response cannot race the bookkeeping. Failures
    /// resolve the future instead of returning.
    fn send_request(&self, command: &str, arguments: Value, resolver: PendingResolver) {
        let mut write_failed = false;
        {
            let guard = self.writer.lock().unwrap();
            let Some(writer) = guard.as_ref() else {
                drop(guard);
                resolver(Err(self.unavailable()));
                return;
            };
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let env = OutgoingRequest {
                seq,
                kind: "request",
                command,
                arguments,
            };
            let payload = match serde_json::to_vec(&env) {
                Ok(p) => p,
                Err(e) => {
                    drop(guard);
                    resolver(Err(Error::new(format!("failed to encode request: {e}"))));
                    return;
                }
            };
            self.pending.lock().unwrap().insert(seq, resolver);
            if !writer.write(&payload) {
                write_failed = true;
            }
        }
        if write_failed {
            // Shutdown drains the pending table, resolving this request's
            // future along with every other outstanding one.
            self.report(&SessionError::WriteFailed.to_string());
            self.shutdown(&SessionError::Closed.to_string());
        }
    }

    fn send_event(&self, event: &str, body: Value) {
        let mut write_failed = false;
        {
            let guard = self.writer.lock().unwrap();
            let Some(writer) = guard.as_ref() else {
                tracing::warn!(event, "dropping event: {}", self.unavailable());
                return;
            };
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let env = OutgoingEvent {
                seq,
                kind: "event",
                event,
                body,
            };
            match serde_json::to_vec(&env) {
                Ok(payload) => {
                    if !writer.write(&payload) {
                        write_failed = true;
                    }
                }
                Err(e) => tracing::warn!(event, "failed to encode event: {e}"),
            }
        }
        if write_failed {
            self.report(&SessionError::WriteFailed.to_string());
            self.shutdown(&SessionError::Closed.to_string());
        }
    }

    /// Writes a response envelope. Returns true once the bytes are flushed
    /// to the transport.
    fn write_response(
        &self,
        request_seq: i64,
        command: &str,
        outcome: Result<Value, &Error>,
    ) -> bool {
        let mut write_failed = false;
        let mut written = false;
        {
            let guard = self.writer.lock().unwrap();
            let Some(writer) = guard.as_ref() else {
                return false;
            };
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let env = match outcome {
                Ok(body) => OutgoingResponse {
                    seq,
                    kind: "response",
                    request_seq,
                    success: true,
                    command,
                    message: None,
                    body: Some(body),
                },
                Err(error) => OutgoingResponse {
                    seq,
                    kind: "response",
                    request_seq,
                    success: false,
                    command,
                    message: Some(&error.message),
                    body: None,
                },
            };
            match serde_json::to_vec(&env) {
                Ok(payload) => {
                    if writer.write(&payload) {
                        written = true;
                    } else {
                        write_failed = true;
                    }
                }
                Err(e) => tracing::warn!(command, "failed to encode response: {e}"),
            }
        }
        if write_failed {
            self.report(&SessionError::WriteFailed.to_string());
            self.shutdown(&SessionError::Closed.to_string());
        }
        written
    }

    /// Terminal close: idempotent. Closes both transport halves, resolves
    /// every pending future with `reason`, and notifies the error handler
    /// once.
    fn shutdown(&self, reason: &str) {
        if self.state.swap(CLOSED, Ordering::SeqCst) == CLOSED {
            return;
        }
        if let Some(reader) = self.reader.lock().unwrap().take() {
            reader.close();
        }
        if let Some(writer) = self.writer.lock().unwrap().take() {
            writer.close();
        }
        let drained: Vec<PendingResolver> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, resolver)| resolver).collect()
        };
        for resolver in drained {
            resolver(Err(Error::new(reason)));
        }
        self.report(reason);
    }
}
