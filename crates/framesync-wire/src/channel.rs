use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use framesync_transport::{diag, ContextId, Endpoint, InboundEvent, ListenerId, TargetOrigin};

use crate::codec::{decode_message, encode_message};
use crate::error::{Result, WireError};
use crate::message::Message;

/// Why an inbound event was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The event was posted by a context other than the bound remote one.
    ForeignSource { source: Option<ContextId> },
    /// The reported origin does not equal the configured target origin.
    OriginMismatch { expected: String, actual: String },
    /// The event data is not a typed message.
    MissingType,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignSource { source: Some(source) } => {
                write!(f, "message from foreign context {source}")
            }
            Self::ForeignSource { source: None } => write!(f, "message from unknown context"),
            Self::OriginMismatch { expected, actual } => {
                write!(f, "origin mismatch: expected '{expected}', got '{actual}'")
            }
            Self::MissingType => write!(f, "message has no type"),
        }
    }
}

/// Acceptance rules applied to every inbound event.
#[derive(Debug, Clone)]
pub struct InboundFilter {
    expected_source: Option<ContextId>,
    target_origin: TargetOrigin,
}

impl InboundFilter {
    pub fn new(expected_source: Option<ContextId>, target_origin: TargetOrigin) -> Self {
        Self {
            expected_source,
            target_origin,
        }
    }

    /// Check source, then origin, then shape.
    pub fn check(&self, event: InboundEvent) -> std::result::Result<Message, Rejection> {
        if let Some(expected) = self.expected_source {
            if event.source != Some(expected) {
                return Err(Rejection::ForeignSource {
                    source: event.source,
                });
            }
        }
        if !self.target_origin.accepts(&event.origin) {
            return Err(Rejection::OriginMismatch {
                expected: self.target_origin.to_string(),
                actual: event.origin,
            });
        }
        decode_message(event.data).map_err(|_| Rejection::MissingType)
    }
}

/// One-way send plus a single filtered listener over an [`Endpoint`].
///
/// The parent side enables the source check, because its window receives
/// messages from every frame it embeds. The child has exactly one possible
/// remote and skips it.
pub struct Channel {
    endpoint: Rc<dyn Endpoint>,
    target_origin: TargetOrigin,
    verify_source: bool,
    log: bool,
    label: &'static str,
    on_rejected: Option<RejectionHook>,
    listener: Cell<Option<ListenerId>>,
}

/// Observer for inbound events the filter refused.
pub type RejectionHook = Rc<dyn Fn(&Rejection)>;

impl Channel {
    pub fn new(endpoint: Rc<dyn Endpoint>, target_origin: TargetOrigin) -> Self {
        Self {
            endpoint,
            target_origin,
            verify_source: false,
            log: false,
            label: "channel",
            on_rejected: None,
            listener: Cell::new(None),
        }
    }

    /// Only accept events posted by the endpoint's remote context.
    pub fn with_source_check(mut self, enabled: bool) -> Self {
        self.verify_source = enabled;
        self
    }

    /// Warn-log rejected events.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log = enabled;
        self
    }

    /// Name used in diagnostics (`child`, `parent`).
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Hand rejected events to `hook` instead of logging them here.
    pub fn with_rejection_hook(mut self, hook: impl Fn(&Rejection) + 'static) -> Self {
        self.on_rejected = Some(Rc::new(hook));
        self
    }

    pub fn target_origin(&self) -> &TargetOrigin {
        &self.target_origin
    }

    pub fn remote(&self) -> ContextId {
        self.endpoint.remote()
    }

    /// Post a message to the remote context.
    pub fn send(&self, message: &Message) -> Result<()> {
        self.endpoint
            .post(encode_message(message), &self.target_origin)?;
        diag!(
            self.log,
            trace,
            agent = self.label,
            msg_type = %message.msg_type,
            "message posted"
        );
        Ok(())
    }

    /// Install the listener. Accepted messages are handed to `on_message`;
    /// everything else is dropped.
    pub fn receive(&self, mut on_message: impl FnMut(Message) + 'static) -> Result<()> {
        if self.listener.get().is_some() {
            return Err(WireError::AlreadyListening);
        }

        let filter = InboundFilter::new(
            self.verify_source.then(|| self.endpoint.remote()),
            self.target_origin.clone(),
        );
        let log = self.log;
        let label = self.label;
        let on_rejected = self.on_rejected.clone();
        let id = self.endpoint.add_listener(Box::new(move |event| {
            match filter.check(event) {
                Ok(message) => on_message(message),
                Err(rejection) => match &on_rejected {
                    Some(hook) => hook(&rejection),
                    None => {
                        diag!(log, warn, agent = label, reason = %rejection, "dropping inbound message");
                    }
                },
            }
        }))?;
        self.listener.set(Some(id));
        Ok(())
    }

    /// Uninstall the listener. Safe to call any number of times.
    pub fn close(&self) {
        if let Some(id) = self.listener.take() {
            self.endpoint.remove_listener(id);
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.get().is_some()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("label", &self.label)
            .field("remote", &self.endpoint.remote())
            .field("target_origin", &self.target_origin)
            .field("verify_source", &self.verify_source)
            .field("listening", &self.is_listening())
            .finish()
    }
}
