//! JSON output for the CLI
//!
//! Every command writes a single JSON object to stdout. Log lines go
//! through the logger, never through here.

use std::io::{self, Write};

use serde_json::Value;

use super::errors::CliResult;

/// Build a success response envelope
pub fn response(data: Value) -> Value {
    serde_json::json!({
        "status": "ok",
        "data": data
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response(data))?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_envelope() {
        let value = response(serde_json::json!({"role": "first"}));
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["role"], "first");
    }
}
