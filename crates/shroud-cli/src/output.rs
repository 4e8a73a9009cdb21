//! Output formatting for CLI results
//!
//! Supports three formats:
//! - Table: human-readable tables (default)
//! - JSON: structured output for scripting
//! - Quiet: no output, exit codes only

use std::str::FromStr;

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use shroud_core::directory::PublishOutcome;
use shroud_core::fanout::GroupDelivery;
use shroud_core::session_keys::SessionSummary;
use shroud_core::Inbound;

use crate::node::IdentityInfo;
use crate::ExitCode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
            exit_code: None,
        }
    }
}

impl JsonResponse<()> {
    pub fn error_with_code(message: &str, code: ExitCode) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: Utc::now().to_rfc3339(),
            command: None,
            exit_code: Some(code as i32),
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    pub fn format_identity(&self, info: &IdentityInfo) -> String {
        match self.format {
            OutputFormat::Table => {
                let own_id = info
                    .own_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                property_table(&[
                    ("Own ID", own_id),
                    ("Fingerprint", info.fingerprint.clone()),
                    ("Algorithm", info.algorithm.to_string()),
                    ("Public Key", info.public_key_path.display().to_string()),
                ])
            }
            OutputFormat::Json => self.to_json_response(&IdentityOutput::from(info), "identity show"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_publish(&self, own_id: u64, outcome: PublishOutcome) -> String {
        let published = outcome == PublishOutcome::Published;
        match self.format {
            OutputFormat::Table if published => format!("✓ Published identity for {own_id}"),
            OutputFormat::Table => format!("✓ Directory already holds the current key for {own_id}"),
            OutputFormat::Json => self.to_json_response(&PublishOutput { own_id, published }, "publish"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_sessions(&self, sessions: &[SessionSummary]) -> String {
        match self.format {
            OutputFormat::Table => {
                if sessions.is_empty() {
                    return "No cached sessions.".to_string();
                }
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Peer ID", "Derived At", "Key Fingerprint"]);
                for s in sessions {
                    table.add_row(vec![
                        s.peer_id.to_string(),
                        format_time(s.derived_at),
                        s.key_fingerprint.clone(),
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(&SessionsOutput::from(sessions), "sessions list"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// The bare envelope goes to stdout in table mode so it can be piped.
    pub fn format_envelope(&self, peer_id: u64, text: &str) -> String {
        match self.format {
            OutputFormat::Table => text.to_string(),
            OutputFormat::Json => self.to_json_response(
                &EnvelopeJson {
                    recipient: peer_id,
                    text: Some(text.to_string()),
                    skipped: None,
                },
                "encrypt",
            ),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_group(&self, deliveries: &[GroupDelivery]) -> String {
        match self.format {
            // One `recipient<TAB>envelope` line per envelope. Skips go to stderr.
            OutputFormat::Table => deliveries
                .iter()
                .filter_map(|d| match d {
                    GroupDelivery::Envelope { recipient, text } => Some(format!("{recipient}\t{text}")),
                    GroupDelivery::Skipped { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Json => {
                let envelopes: Vec<EnvelopeJson> = deliveries.iter().map(EnvelopeJson::from).collect();
                self.to_json_response(&envelopes, "encrypt --group")
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_inbound(&self, inbound: &Inbound) -> String {
        match (self.format, inbound) {
            (OutputFormat::Table, Inbound::Plaintext(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            (OutputFormat::Table, Inbound::NotForUs { recipient }) => {
                format!("Message is addressed to {recipient}; not decrypted.")
            }
            (OutputFormat::Json, inbound) => self.to_json_response(&InboundOutput::from(inbound), "decrypt"),
            (OutputFormat::Quiet, _) => String::new(),
        }
    }

    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    pub fn error(&self, message: &str, code: ExitCode) {
        match self.format {
            OutputFormat::Table => eprintln!("✗ {message}"),
            OutputFormat::Json => println!("{}", self.to_json(&JsonResponse::error_with_code(message, code))),
            OutputFormat::Quiet => {}
        }
    }

    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("⚠ {message}");
        }
    }

    /// Only shown in verbose table mode.
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        self.to_json(&JsonResponse::success_with_command(value, command))
    }
}

fn property_table(rows: &[(&str, String)]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Property", "Value"]);
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value.clone()]);
    }
    table.to_string()
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

// JSON output structures

#[derive(Serialize)]
struct IdentityOutput {
    own_id: Option<u64>,
    fingerprint: String,
    algorithm: String,
    public_key_path: String,
}

impl From<&IdentityInfo> for IdentityOutput {
    fn from(i: &IdentityInfo) -> Self {
        Self {
            own_id: i.own_id.map(|id| id.0),
            fingerprint: i.fingerprint.clone(),
            algorithm: i.algorithm.to_string(),
            public_key_path: i.public_key_path.display().to_string(),
        }
    }
}

#[derive(Serialize)]
struct PublishOutput {
    own_id: u64,
    published: bool,
}

#[derive(Serialize)]
struct SessionsOutput {
    sessions: Vec<SessionJson>,
    count: usize,
}

#[derive(Serialize)]
struct SessionJson {
    peer_id: u64,
    derived_at: String,
    key_fingerprint: String,
}

impl From<&[SessionSummary]> for SessionsOutput {
    fn from(sessions: &[SessionSummary]) -> Self {
        Self {
            count: sessions.len(),
            sessions: sessions
                .iter()
                .map(|s| SessionJson {
                    peer_id: s.peer_id.0,
                    derived_at: s.derived_at.to_rfc3339(),
                    key_fingerprint: s.key_fingerprint.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct EnvelopeJson {
    recipient: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<String>,
}

impl From<&GroupDelivery> for EnvelopeJson {
    fn from(d: &GroupDelivery) -> Self {
        match d {
            GroupDelivery::Envelope { recipient, text } => Self {
                recipient: recipient.0,
                text: Some(text.clone()),
                skipped: None,
            },
            GroupDelivery::Skipped { recipient, reason } => Self {
                recipient: recipient.0,
                text: None,
                skipped: Some(reason.to_string()),
            },
        }
    }
}

#[derive(Serialize)]
struct InboundOutput {
    for_us: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    plaintext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<u64>,
}

impl From<&Inbound> for InboundOutput {
    fn from(inbound: &Inbound) -> Self {
        match inbound {
            Inbound::Plaintext(bytes) => Self {
                for_us: true,
                plaintext: Some(String::from_utf8_lossy(bytes).into_owned()),
                recipient: None,
            },
            Inbound::NotForUs { recipient } => Self {
                for_us: false,
                plaintext: None,
                recipient: Some(recipient.0),
            },
        }
    }
}
