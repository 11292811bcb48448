pub mod commands;
pub mod error;
pub mod output;
pub mod session;

pub use commands::{QueryCommand, ReplayCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, truncate_string};
pub use session::{Domain, DomainSession};
