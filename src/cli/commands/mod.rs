//! Command execution coordinating a bundling run.
//!
//! Validates arguments, runs the bundle command and turns failures into a
//! printed error with recovery suggestions plus a non-zero exit code.

mod bundle;

use crate::cli::{Args, RuntimeConfig};
use crate::error::{BundletoolError, CliError, Result};

use bundle::execute_bundle;

/// Execute the bundle command for the parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(reason) = args.validate() {
        // Validation errors are shown even in quiet mode
        let output = super::OutputManager::new(false, false);
        output.error(&BundletoolError::from(CliError::InvalidArguments { reason }).to_string());
        return Ok(1);
    }

    let config = RuntimeConfig::from(&args);

    match execute_bundle(&args, &config).await {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            let output = config.output();
            output.error(&format!("Bundling failed: {}", e));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() && !output.is_quiet() {
                let _ = output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    let _ = output.indent(&format!("• {}", suggestion));
                }
            }

            Ok(1)
        }
    }
}
