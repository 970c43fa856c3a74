use std::io::IsTerminal;

use clap::ValueEnum;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Text on a terminal, JSON when piped.
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            OutputFormat::Text
        } else {
            OutputFormat::Json
        }
    }
}

/// Print a command result: the text rendering on terminals, one JSON
/// object per line otherwise.
pub fn emit(format: OutputFormat, text: &str, json: &serde_json::Value) {
    match format {
        OutputFormat::Text => println!("{text}"),
        OutputFormat::Json => println!("{json}"),
    }
}

pub fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
