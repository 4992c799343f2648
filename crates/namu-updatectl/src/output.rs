//! Output formatting for CLI results

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use namu_updater::{ApplyState, UpdateDecision, UpdateEvent, UpdaterConfig};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Table,
    /// JSON for scripting
    Json,
    /// Exit codes only
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

/// Render a resolution result.
pub fn format_decision(decision: &UpdateDecision, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Quiet => None,
        OutputFormat::Json => serde_json::to_string_pretty(decision).ok(),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Property", "Value"]);
            table.add_row(vec!["Current", &decision.current_version.to_string()]);
            table.add_row(vec!["Platform", &decision.platform.to_string()]);
            table.add_row(vec!["Reason", &format!("{:?}", decision.reason)]);
            if let Some(candidate) = &decision.candidate {
                table.add_row(vec!["Latest", &candidate.version().to_string()]);
                table.add_row(vec!["Source", &candidate.source().to_string()]);
                if let Some(url) = candidate.download_url() {
                    table.add_row(vec!["Package", url]);
                }
                if !candidate.release_notes().is_empty() {
                    table.add_row(vec!["Notes", candidate.release_notes()]);
                }
            }
            Some(format!("{}\n{table}", decision.user_message()))
        }
    }
}

/// Render one apply progress step.
pub fn format_apply_state(state: &ApplyState, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Quiet => None,
        OutputFormat::Json => serde_json::to_string(state).ok(),
        OutputFormat::Table => Some(match state {
            ApplyState::Downloading(percent) => format!("Downloading... {percent}%"),
            other => other.to_string(),
        }),
    }
}

/// Render an event seen by `watch`.
pub fn format_event(event: &UpdateEvent, format: OutputFormat) -> Option<String> {
    match (event, format) {
        (_, OutputFormat::Quiet) => None,
        (
            UpdateEvent::UpdateAvailable {
                candidate,
                current_version,
            },
            OutputFormat::Json,
        ) => serde_json::to_string(&serde_json::json!({
            "event": event.kind(),
            "version": candidate.version(),
            "current": current_version,
            "source": candidate.source(),
        }))
        .ok(),
        (
            UpdateEvent::UpdateAvailable {
                candidate,
                current_version,
            },
            OutputFormat::Table,
        ) => Some(format!(
            "Update available: {} (current {}) via {}",
            candidate.version(),
            current_version,
            candidate.source()
        )),
        (UpdateEvent::ApplyStateChanged(state), format) => format_apply_state(state, format),
    }
}

pub fn format_config(
    config: &UpdaterConfig,
    format: OutputFormat,
) -> anyhow::Result<Option<String>> {
    Ok(match format {
        OutputFormat::Quiet => None,
        OutputFormat::Json => Some(serde_json::to_string_pretty(config)?),
        OutputFormat::Table => {
            // Nested sections are flattened to dotted keys.
            let mut rows = Vec::new();
            flatten("", &serde_json::to_value(config)?, &mut rows);

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Setting", "Value"]);
            for (key, value) in rows {
                table.add_row(vec![key, value]);
            }
            Some(table.to_string())
        }
    })
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        other => out.push((prefix.to_string(), other.to_string())),
    }
}
