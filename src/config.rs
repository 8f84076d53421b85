//! Reconciler configuration
//!
//! Settings arrive as JSON, either in `initializationOptions` or in
//! `workspace/didChangeConfiguration`, optionally nested under a `bitbake` section.

use serde_json::Value;

/// Last line of the synthetic preamble where generated Python documents get their imports
pub const DEFAULT_IMPORT_LINE_THRESHOLD: u32 = 7;

/// Configuration for the diagnostics reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub enabled: bool,
    pub import_line_threshold: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            enabled: true,
            import_line_threshold: DEFAULT_IMPORT_LINE_THRESHOLD,
        }
    }
}

impl Configuration {
    /// Overlay the settings present in `value`; absent keys keep their current value.
    pub fn apply(&mut self, value: &Value) {
        let value = value.get("bitbake").unwrap_or(value);

        self.enabled = value
            .get("enableDiagnostics")
            .and_then(Value::as_bool)
            .unwrap_or(self.enabled);

        self.import_line_threshold = value
            .get("importLineThreshold")
            .and_then(Value::as_u64)
            .map(|x| x as u32)
            .unwrap_or(self.import_line_threshold);
    }
}
