//! Context used by policy components for logging.

/// Holds the component name and the current simulation time.
///
/// The time is not advanced by the context itself, it is set by the caller (simulation kernel) on each entry
/// into the policy.
#[derive(Clone, Debug)]
pub struct PolicyContext {
    name: String,
    time: f64,
}

impl PolicyContext {
    /// Creates context for component with specified name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            time: 0.,
        }
    }

    /// Returns component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Updates the current simulation time.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }
}
