use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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

/// Outcome of one `echo` run.
#[derive(Debug, Serialize)]
pub struct EchoReport {
    pub mode: &'static str,
    pub port: u16,
    pub buffer_capacity: usize,
    pub client_count: usize,
    pub messages_per_client: usize,
    pub total_sent: usize,
    pub total_matched: usize,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub clients: Vec<ClientReport>,
}

/// Per-client counters of an `echo` run.
#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    pub client: String,
    pub sent: usize,
    pub matched: usize,
    pub elapsed_ms: u64,
}

impl EchoReport {
    pub fn all_matched(&self) -> bool {
        !self.timed_out
            && self.clients.len() == self.client_count
            && self.total_matched == self.total_sent
            && self
                .clients
                .iter()
                .all(|client| client.sent == self.messages_per_client)
    }
}

pub fn print_echo_report(report: &EchoReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CLIENT", "SENT", "MATCHED", "ELAPSED (ms)"]);
            for client in &report.clients {
                table.add_row(vec![
                    client.client.clone(),
                    client.sent.to_string(),
                    client.matched.to_string(),
                    client.elapsed_ms.to_string(),
                ]);
            }
            table.add_row(vec![
                "TOTAL".to_string(),
                report.total_sent.to_string(),
                report.total_matched.to_string(),
                report.elapsed_ms.to_string(),
            ]);
            println!("{table}");
            if report.timed_out {
                println!("timed out before all clients finished");
            }
        }
        OutputFormat::Pretty => {
            println!(
                "mode={} port={} buffer_capacity={} messages_per_client={}",
                report.mode, report.port, report.buffer_capacity, report.messages_per_client
            );
            for client in &report.clients {
                println!(
                    "  {}: sent={} matched={} elapsed={}ms",
                    client.client, client.sent, client.matched, client.elapsed_ms
                );
            }
            println!(
                "total: sent={} matched={} elapsed={}ms{}",
                report.total_sent,
                report.total_matched,
                report.elapsed_ms,
                if report.timed_out { " (timed out)" } else { "" }
            );
        }
    }
}
