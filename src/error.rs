use crate::core::event::EventSummary;
use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for the simulation core.
///
/// Scheduler-fatal variants carry the offending event's full description so
/// a failing run can be diagnosed from the error alone.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical or geometric issue (e.g., degenerate contact normal, catastrophic cancellation).
    #[error("numerical error: {0}")]
    MathError(String),

    /// A factory key (scheduler or sorter variant) was not recognised.
    #[error("unknown variant: {0}")]
    UnknownVariant(String),

    /// The event at the root of the queue has a NaN or infinite time,
    /// which indicates a broken predictor.
    #[error("non-finite event time at dispatch: {0}")]
    BrokenPrediction(EventSummary),

    /// A NONE event reached the root of the queue: the simulation has run
    /// out of events.
    #[error("simulation has run out of events: {0}")]
    OutOfEvents(EventSummary),

    /// The root of the queue points at a particle with an empty event list.
    #[error("event list for particle {0} is empty but at the top of the queue")]
    EmptyEventList(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_informative() {
        let e = Error::InvalidParam("radius must be > 0".to_string());
        let msg = format!("{e}");
        assert!(msg.contains("invalid parameter"));
        assert!(msg.contains("radius"));
    }

    #[test]
    fn unknown_variant_names_the_key() {
        let e = Error::UnknownVariant("Quantum".to_string());
        assert!(format!("{e}").contains("Quantum"));
    }
}
