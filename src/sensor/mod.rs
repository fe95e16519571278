//! Sensor Samples
//!
//! Types for timestamped HRV/EDA samples and the sources that produce them.

mod source;
mod types;

pub use source::{
    SampleSource, SimulatedSource, SimulatedSourceFactory, SimulationConfig, SourceFactory,
};
pub use types::{ChannelReading, Sample, MAX_QUALITY};
