use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use loralink_driver::RemoteMessage;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    event: &'static str,
    source: &'a str,
    declared_len: Option<u8>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct OutcomeOutput<'a> {
    event: &'static str,
    action: &'a str,
    target: Option<&'a str>,
    ok: bool,
    timestamp: String,
}

pub fn print_message(message: &RemoteMessage, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                event: "message-received",
                source: &message.source,
                declared_len: message.declared_len,
                payload_size: message.payload.len(),
                payload: payload_preview(message.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    message.source.clone(),
                    message.payload.len().to_string(),
                    payload_preview(message.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "source={} size={} payload={}",
                message.source,
                message.payload.len(),
                payload_preview(message.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(message.payload.as_ref());
        }
    }
}

/// Report the result of a one-shot command.
pub fn print_outcome(action: &str, target: Option<&str>, ok: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = OutcomeOutput {
                event: "command-completed",
                action,
                target,
                ok,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ACTION", "TARGET", "RESULT"])
                .add_row(vec![
                    action.to_string(),
                    target.unwrap_or("-").to_string(),
                    outcome_label(ok).to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match target {
            Some(target) => println!("{action} {target}: {}", outcome_label(ok)),
            None => println!("{action}: {}", outcome_label(ok)),
        },
        OutputFormat::Raw => {
            print_raw(outcome_label(ok).as_bytes());
            print_raw(b"\n");
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn outcome_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "rejected"
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
