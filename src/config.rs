/// Knobs for loading and running a program. `Config::default()` matches the
/// behaviour of the bare `run` entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// If set, a `call` that would push the call stack past this depth fails with a
    /// stack overflow. Unbounded by default.
    pub max_call_depth: Option<usize>,
    /// Reject unknown commands, and labels with trailing tokens, while loading
    /// instead of treating them as no-ops.
    pub strict: bool,
}
