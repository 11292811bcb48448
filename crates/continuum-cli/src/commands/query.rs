use std::path::PathBuf;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};
use crate::session::{Domain, DomainSession};

#[derive(Parser)]
pub struct QueryCommand {
    #[clap(long, short, help = "Path to a JSON-lines event log")]
    pub input: PathBuf,

    #[clap(long, short, value_enum, help = "Which memory specialization to drive")]
    pub domain: Domain,

    #[clap(long, short, help = "Query text")]
    pub query: String,

    #[clap(long, short, default_value = "5", help = "Maximum number of results")]
    pub k: usize,
}

impl QueryCommand {
    pub fn execute(&self, format: OutputFormat) -> CliResult<()> {
        let mut session = DomainSession::new(self.domain)?;
        session.replay_file(&self.input)?;
        let results = session.retrieve(&self.query, self.k);

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            OutputFormat::Table => {
                if results.is_empty() {
                    println!("No results for \"{}\"", self.query);
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["#", "Level", "Score", "Similarity", "Payload"]);

                for (i, item) in results.iter().enumerate() {
                    let payload = item
                        .payload
                        .get("text")
                        .and_then(serde_json::Value::as_str)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| item.payload.to_string());
                    table.add_row([
                        &(i + 1).to_string(),
                        &item.level,
                        &format!("{:.3}", item.score),
                        &format!("{:.3}", item.similarity),
                        &truncate_string(&payload, 60),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}
