// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use docket_common::types::Document;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

use crate::http::ClientError;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    /// Auto-detect format: JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    /// Testable variant that takes an explicit `is_tty` flag.
    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Write a value to stdout in the selected format.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => writeln!(writer, "{}", human_fn(value)),
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    print_stderr(format, "error", ANSI_RED, code, message);
}

pub fn print_warning(format: OutputFormat, code: &str, message: &str) {
    print_stderr(format, "warning", ANSI_YELLOW, code, message);
}

fn print_stderr(format: OutputFormat, label: &str, color: &str, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    match format {
        OutputFormat::Human => {
            let line = render_human_stderr_line(label, message, io::stderr().is_terminal(), color);
            let _ = writeln!(err, "{line}");
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({ label: { "code": code, "message": message } });
            let _ = serde_json::to_writer(&mut err, &obj);
            let _ = writeln!(err);
        }
    }
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn actionable_error(error: &anyhow::Error) -> (&str, String) {
    let message = format!("{error:#}");
    let Some(client_error) = error.chain().find_map(|cause| cause.downcast_ref::<ClientError>())
    else {
        return ("CLIENT_ERROR", message);
    };

    match client_error {
        ClientError::Conflict { .. } => (
            "OPTIMISTIC_LOCK_ERROR",
            "Someone else saved this document. Reload it, or re-run with --overwrite".to_string(),
        ),
        ClientError::Api { code, details, .. } if code == "VALIDATION_FAILED" => {
            let fields = details["fields"]
                .as_array()
                .map(|fields| {
                    fields.iter().filter_map(|field| field.as_str()).collect::<Vec<_>>().join(", ")
                })
                .unwrap_or_default();
            if fields.is_empty() {
                ("VALIDATION_FAILED", message)
            } else {
                ("VALIDATION_FAILED", format!("Fix these fields and save again: {fields}"))
            }
        }
        ClientError::Api { code, .. } if code == "NOT_FOUND" => {
            ("NOT_FOUND", "Document not found, or it was deleted".to_string())
        }
        ClientError::Transport(_) => (
            "NETWORK_ERROR",
            format!("Could not reach the docket server. Check server_url in ~/.docket/client.toml ({message})"),
        ),
        other => (other.code().unwrap_or("CLIENT_ERROR"), message),
    }
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}

/// One header line plus one line per item.
pub fn format_document_human(document: &Document) -> String {
    let mut lines = vec![format!(
        "{} {} [{}] modified {}",
        document.number,
        document.name,
        document.status,
        document.modified_at.to_rfc3339()
    )];
    lines.push(format!("  id: {}", document.id));
    for item in &document.items {
        lines.push(format!("  {:>3}. {} ({})", item.order + 1, item.product_name, item.total));
    }
    if !document.remarks.is_empty() {
        let open = document.remarks.iter().filter(|remark| !remark.is_completed).count();
        lines.push(format!("  remarks: {} ({open} open)", document.remarks.len()));
    }
    lines.join("\n")
}
