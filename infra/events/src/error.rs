use std::borrow::Cow;

/// Errors surfaced by [`EventBus`](crate::EventBus) operations.
#[herald_derive::herald_error]
pub enum BusError {
    /// The bus was called from a thread its enforcer rejects.
    #[error("Thread affinity violation{}: {message}", format_context(.context))]
    ThreadAffinity { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Two hosts declare a producer for the same event type.
    #[error(
        "Duplicate producer for {event_type}{}: already registered by {existing}, rejected {incoming}",
        format_context(.context)
    )]
    DuplicateProducer {
        event_type: Cow<'static, str>,
        existing: Cow<'static, str>,
        incoming: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// The host already holds this binding (strict mode only).
    #[error("Host {host} already registered for {event_type}{}", format_context(.context))]
    AlreadyRegistered {
        host: Cow<'static, str>,
        event_type: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// The host holds no such binding (strict mode only).
    #[error("Host {host} is not registered for {event_type}{}", format_context(.context))]
    NotRegistered {
        host: Cow<'static, str>,
        event_type: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// Delivery reached a subscription or producer that had already been invalidated.
    /// This signals a race in unregistration and is never retried.
    #[error("Stale dispatch{}: {message}", format_context(.context))]
    StaleDispatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A finder handed the bus a method whose declared types do not match the value.
    #[error("Type mismatch{}: {message}", format_context(.context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl BusError {
    /// Whether lenient mode absorbs this error.
    #[must_use]
    pub const fn is_registration_conflict(&self) -> bool {
        matches!(self, Self::AlreadyRegistered { .. } | Self::NotRegistered { .. })
    }
}
