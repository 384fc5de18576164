//! Dispatch module - Routes decoded requests to their handlers
//!
//! Each request kind has at most one handler. Whatever happens while decoding
//! or handling a request, the dispatcher answers with a message: either the
//! handler's reply or a `ServiceException` describing the failure.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use thiserror::Error;

use crate::protocol::{DecodeError, Decoder, Message, MessageKind, Registry, Request};

/// Dispatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown message")]
    UnrecognizedRequestType(MessageKind),

    #[error("{0}")]
    HandlerFailure(String),

    #[error("Handler already registered for {0}")]
    DuplicateHandler(MessageKind),

    #[error("{0} is not in the dispatcher's registry")]
    NotRegistered(MessageKind),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// A request handler, type-erased over its request kind
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Message) -> DispatchResult<Message>;
}

/// Adapts a function over a typed request into a [`Handler`]
struct TypedHandler<R, E, F> {
    handler: F,
    _phantom: PhantomData<fn(R) -> E>,
}

impl<R, E, F> Handler for TypedHandler<R, E, F>
where
    R: Request,
    E: fmt::Display + 'static,
    F: Fn(R) -> Result<R::Reply, E> + Send + Sync + 'static,
{
    fn call(&self, request: Message) -> DispatchResult<Message> {
        let kind = request.kind();
        let request = R::from_message(request).ok_or(DispatchError::UnrecognizedRequestType(kind))?;

        (self.handler)(request)
            .map(Into::into)
            .map_err(|e| DispatchError::HandlerFailure(e.to_string()))
    }
}

/// Routes each request to the handler registered for its kind
pub struct Dispatcher {
    registry: Registry,
    handlers: HashMap<MessageKind, Box<dyn Handler>>,
}

impl Dispatcher {
    /// Create a dispatcher with no handlers
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for request type `R`
    pub fn on<R, E, F>(&mut self, handler: F) -> DispatchResult<&mut Self>
    where
        R: Request,
        E: fmt::Display + 'static,
        F: Fn(R) -> Result<R::Reply, E> + Send + Sync + 'static,
    {
        if !self.registry.contains(R::KIND) {
            return Err(DispatchError::NotRegistered(R::KIND));
        }
        if self.handlers.contains_key(&R::KIND) {
            return Err(DispatchError::DuplicateHandler(R::KIND));
        }

        self.handlers.insert(
            R::KIND,
            Box::new(TypedHandler {
                handler,
                _phantom: PhantomData,
            }),
        );
        Ok(self)
    }

    /// Registry this dispatcher accepts requests from
    pub fn registry(&self) -> Registry {
        self.registry
    }

    /// Check if a handler is registered for the kind
    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handler for a request
    pub fn try_dispatch(&self, request: Message) -> DispatchResult<Message> {
        let kind = request.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(DispatchError::UnrecognizedRequestType(kind))?;
        handler.call(request)
    }

    /// Run the handler for a request, turning any failure into a `ServiceException`
    pub fn dispatch(&self, request: Message) -> Message {
        let kind = request.kind();
        match self.try_dispatch(request) {
            Ok(reply) => {
                tracing::debug!("{} handled, replying with {}", kind, reply.kind());
                reply
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", kind, e);
                Message::exception(e.to_string())
            }
        }
    }

    /// Decode a raw request for this dispatcher.
    ///
    /// On failure the error is already turned into the `ServiceException` to
    /// send back, so no handler ever sees a request that failed to decode.
    pub fn decode_request(
        &self,
        decoder: &Decoder,
        payload: Result<Bytes, DecodeError>,
    ) -> Result<Message, Message> {
        debug_assert_eq!(decoder.registry(), self.registry);
        payload
            .and_then(|bytes| decoder.decode(&bytes))
            .map_err(|e| {
                tracing::warn!("Rejected request: {}", e);
                Message::exception(e.to_string())
            })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("handlers", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn upper_dispatcher(calls: Arc<AtomicUsize>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(Registry::upper());
        dispatcher
            .on(move |request: UpperRequest| {
                calls.fetch_add(1, Ordering::SeqCst);
                if request.text == "fail" {
                    return Err("handler refused");
                }
                Ok(UpperReply {
                    result: request.text.to_uppercase(),
                })
            })
            .unwrap();
        dispatcher
    }

    fn expect_exception(message: Message) -> String {
        match message {
            Message::ServiceException(e) => e.message,
            other => panic!("Expected ServiceException, got {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_to_handler() {
        let dispatcher = upper_dispatcher(Arc::new(AtomicUsize::new(0)));
        let reply = dispatcher.dispatch(Message::UpperRequest(UpperRequest {
            text: "hello".to_string(),
        }));
        assert_eq!(
            reply,
            Message::UpperReply(UpperReply {
                result: "HELLO".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_message() {
        let dispatcher = upper_dispatcher(Arc::new(AtomicUsize::new(0)));
        let reply = dispatcher.dispatch(Message::UpperReply(UpperReply::default()));
        assert_eq!(expect_exception(reply), "unknown message");
    }

    #[test]
    fn test_handler_failure_becomes_exception() {
        let dispatcher = upper_dispatcher(Arc::new(AtomicUsize::new(0)));
        let reply = dispatcher.dispatch(Message::UpperRequest(UpperRequest {
            text: "fail".to_string(),
        }));
        assert_eq!(expect_exception(reply), "handler refused");
    }

    #[test]
    fn test_duplicate_handler() {
        let mut dispatcher = upper_dispatcher(Arc::new(AtomicUsize::new(0)));
        let err = dispatcher
            .on(|request: UpperRequest| Ok::<_, DispatchError>(UpperReply { result: request.text }))
            .unwrap_err();
        assert_eq!(err, DispatchError::DuplicateHandler(MessageKind::UpperRequest));
    }

    #[test]
    fn test_handler_outside_registry() {
        let mut dispatcher = Dispatcher::new(Registry::upper());
        let err = dispatcher
            .on(|_: MaterialRequest| Ok::<_, DispatchError>(MaterialRequestReply::default()))
            .unwrap_err();
        assert_eq!(err, DispatchError::NotRegistered(MessageKind::MaterialRequest));
        assert!(!dispatcher.handles(MessageKind::MaterialRequest));
    }

    #[test]
    fn test_rejects_before_handler_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = upper_dispatcher(calls.clone());
        let decoder = Decoder::new(Registry::upper(), DEFAULT_MAX_MESSAGE_SIZE);

        let payload = Bytes::from_static(
            br#"{"type-name":"UpperRequest","namespace":"subprocess","text":"hello"}"#,
        );
        let exception = dispatcher.decode_request(&decoder, Ok(payload)).unwrap_err();

        assert!(!expect_exception(exception).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transport_error_becomes_exception() {
        let dispatcher = upper_dispatcher(Arc::new(AtomicUsize::new(0)));
        let decoder = Decoder::new(Registry::upper(), DEFAULT_MAX_MESSAGE_SIZE);
        let exception = dispatcher
            .decode_request(&decoder, Err(DecodeError::Timeout))
            .unwrap_err();
        assert_eq!(expect_exception(exception), DecodeError::Timeout.to_string());
    }

    #[test]
    fn test_decode_then_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = upper_dispatcher(calls.clone());
        let decoder = Decoder::new(Registry::upper(), DEFAULT_MAX_MESSAGE_SIZE);

        let payload = Bytes::from_static(
            br#"{"type-name":"UpperRequest","namespace":"local","text":"hello"}"#,
        );
        let request = dispatcher.decode_request(&decoder, Ok(payload)).unwrap();
        let reply = dispatcher.dispatch(request);

        assert!(matches!(reply, Message::UpperReply(ref r) if r.result == "HELLO"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
