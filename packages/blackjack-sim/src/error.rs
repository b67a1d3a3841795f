use thiserror::Error;

/// Typed errors for the simulation engine (spec §7).
///
/// Round resolution and settlement never produce errors on valid input —
/// the only failures are synchronous request validation, and engine
/// invariant violations that are always bugs, never user input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// The request's rules, ramp, or settings violate a documented
    /// invariant. Reported synchronously from `start`; no run is created.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A fatal engine invariant was violated (card exhaustion, an
    /// impossible hand state). Always a bug. The chunk that hit it
    /// aborts; the coordinator fails the whole run.
    #[error("engine invariant violated: {0}")]
    EngineInvariant(String),

    /// `status`/`get`/`stop` referenced a `RunHandle` the coordinator
    /// doesn't know about.
    #[error("unknown run handle")]
    RunNotFound,
}
