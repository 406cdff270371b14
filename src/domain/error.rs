// Data-quality faults raised while normalizing telemetry
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleFault {
    #[error("sample {index} has neither timestamp nor sim_ts")]
    MissingTimestamp { index: usize },

    #[error("sample {index} has a non-numeric {field}")]
    NonNumeric { index: usize, field: &'static str },
}
