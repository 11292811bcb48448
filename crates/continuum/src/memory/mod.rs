//! The Continuum memory engine
//!
//! - `types`: entries, write outcomes, stats snapshots
//! - `level`: one temporal-scale store with a fixed encoder
//! - `surprise`: bounded surprise metrics gating consolidation
//! - `cms`: the multi-level system owning levels and the step clock

pub mod cms;
pub mod level;
pub mod surprise;
pub mod types;

pub use cms::ContinuumMemorySystem;
pub use level::MemoryLevel;
pub use surprise::{SurpriseCalculator, SurpriseMetric};
pub use types::{CmsStats, LevelStats, MemoryEntry, ScoredItem, WriteOutcome};
