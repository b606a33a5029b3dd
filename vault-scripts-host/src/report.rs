//! Script error reporting
//!
//! Every failure raised by a script after its source was accepted ends here:
//! one `tracing` error event plus one error notice on the host.

use crate::host::Host;
use std::fmt::Display;
use std::sync::Arc;
use vault_scripts_api::Notice;

/// Event label for failures while evaluating a script or running its constructor
pub const ON_CONSTRUCT: &str = "On Construct";

/// Event label for batched command removal failures
pub const REMOVE_COMMANDS: &str = "Remove Commands";

/// Logs script failures and forwards them to the host as notices
#[derive(Clone)]
pub struct ErrorReporter {
    host: Arc<dyn Host>,
}

impl ErrorReporter {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    pub fn report(&self, event: &str, script: &str, error: &dyn Display) {
        let message = error.to_string();
        tracing::error!(event = %event, script = %script, error = %message, "Script error");
        self.host
            .notify(Notice::script_error(event, script, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use vault_scripts_api::ScriptError;

    #[test]
    fn test_report_emits_one_notice() {
        let host = Arc::new(MemoryHost::new());
        let reporter = ErrorReporter::new(host.clone());

        reporter.report("On Load", "a.lua", &ScriptError::runtime("boom"));

        let notices = host.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(
            notices[0],
            Notice::script_error("On Load", "a.lua", "[RuntimeError] boom")
        );
    }
}
