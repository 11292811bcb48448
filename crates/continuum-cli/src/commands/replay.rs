use std::path::PathBuf;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::error::CliResult;
use crate::output::OutputFormat;
use crate::session::{Domain, DomainSession};

#[derive(Parser)]
pub struct ReplayCommand {
    #[clap(long, short, help = "Path to a JSON-lines event log")]
    pub input: PathBuf,

    #[clap(long, short, value_enum, help = "Which memory specialization to drive")]
    pub domain: Domain,
}

impl ReplayCommand {
    pub fn execute(&self, format: OutputFormat) -> CliResult<()> {
        let mut session = DomainSession::new(self.domain)?;
        let applied = session.replay_file(&self.input)?;
        let stats = session.stats();

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "events_applied": applied,
                    "stats": stats,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Replayed {} events (global step {})\n", applied, stats.global_step);
                println!("{}", render_stats_table(&stats));
            }
        }

        Ok(())
    }
}

pub(crate) fn render_stats_table(stats: &continuum::memory::types::CmsStats) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header([
            "Level",
            "Size",
            "Encodes",
            "Updates",
            "Retrievals",
            "Avg Surprise",
            "Freq",
            "Frozen",
        ]);

    for (name, level) in &stats.levels {
        let freq = if level.frozen {
            "-".to_string()
        } else {
            level.update_freq.to_string()
        };
        table.add_row([
            name.as_str(),
            &level.size.to_string(),
            &level.encodes.to_string(),
            &level.updates.to_string(),
            &level.retrievals.to_string(),
            &format!("{:.3}", level.avg_surprise),
            &freq,
            if level.frozen { "yes" } else { "no" },
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_table_has_one_row_per_level() {
        let mut session = DomainSession::new(Domain::Chat).unwrap();
        session
            .apply(r#"{"event":"record","role":"user","text":"hello there"}"#)
            .unwrap();

        let stats = session.stats();
        let table = render_stats_table(&stats);
        assert_eq!(table.row_iter().count(), stats.levels.len());
    }
}
