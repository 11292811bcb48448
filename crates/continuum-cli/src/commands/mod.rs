pub mod query;
pub mod replay;

pub use query::QueryCommand;
pub use replay::ReplayCommand;
