use serde_json::Value;

use crate::error::CliError;

/// Print the response envelope to stdout.
pub fn render(envelope: &Value, pretty: bool) -> Result<(), CliError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    println!("{rendered}");
    Ok(())
}
