//! Weather data for Sologyr
//!
//! Parses the interval feed, assembles the per-day forecast window and
//! fetches everything over HTTP.

pub mod assembler;
pub mod current;
pub mod parser;
pub mod provider;
pub mod sun;
pub mod types;

pub use assembler::{LabelTables, WindowAssembler};
pub use current::{ConditionIcon, CurrentConditions};
pub use provider::FeedClient;
pub use sun::{sun_times, SunTimes};
pub use types::*;
