use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framesync::simulate::{Observation, Observed};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct ObservedOutput<'a> {
    schema_id: &'a str,
    #[serde(flatten)]
    observed: &'a Observed,
}

pub fn print_observed(observed: &[Observed], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for entry in observed {
                let out = ObservedOutput {
                    schema_id: "https://schemas.3leaps.dev/framesync/cli/v1/observed-event.schema.json",
                    observed: entry,
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "AT (ms)", "EVENT", "DETAIL"]);
            for entry in observed {
                table.add_row(vec![
                    entry.seq.to_string(),
                    entry.at_ms.to_string(),
                    entry.observation.kind().to_string(),
                    detail(&entry.observation),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in observed {
                println!(
                    "seq={} at={}ms event={} {}",
                    entry.seq,
                    entry.at_ms,
                    entry.observation.kind(),
                    detail(&entry.observation)
                );
            }
        }
    }
}

fn detail(observation: &Observation) -> String {
    match observation {
        Observation::Ready { data } => format!("data={data}"),
        Observation::Resize {
            width: Some(width),
            height,
        } => format!("height={height} width={width}"),
        Observation::Resize {
            width: None,
            height,
        } => format!("height={height}"),
        Observation::Scroll { left, top } => format!("left={left} top={top}"),
        Observation::Message { msg_type, data } => format!("type={msg_type} data={data}"),
    }
}
