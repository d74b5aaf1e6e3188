/// Tri-state decision of whether a generation task must execute this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnableStatus {
    /// The generator must be invoked.
    Run,
    /// Previous outputs can be reused; the task terminates immediately after
    /// re-establishing the side effects a real run would have produced.
    Skip,
    /// Inputs are not ready yet; the host scheduler retries later in the
    /// same build.
    Defer,
}

/// Upstream staleness verdict for a task, supplied by the host scheduler's
/// generic timestamp/signature check before the engine applies its own
/// cached-output logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Inputs, scripts or dependency files changed since the last run.
    Stale,
    /// Nothing the generic check looks at has changed.
    Fresh,
    /// The check could not decide yet.
    Undetermined,
}
