//! Helper macro enforcing consistent readiness log fields.
//!
//! Keeps the `dependency` (and optionally `phase`) fields present on every log
//! emitted from the phase and orchestrator layers so downstream parsing can rely
//! on them.

/// Log an event for a dependency/phase pair plus any extra fields.
#[macro_export]
macro_rules! readiness_event {
    ($level:ident, $event:expr, dependency = $dependency:expr, phase = $phase:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            event = $event,
            dependency = %$dependency,
            phase = %$phase,
            $($field = %$value,)*
        )
    };
    ($level:ident, $event:expr, dependency = $dependency:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            event = $event,
            dependency = %$dependency,
            $($field = %$value,)*
        )
    };
}
