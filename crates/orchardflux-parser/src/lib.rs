pub mod builder;
pub mod errors;
pub mod model;
pub mod sources;

pub use builder::build_sample;
pub use errors::{SampleError, SourceError};
pub use model::{FieldType, FieldValue, RawRow, Sample, SampleSpec};
pub use sources::{
    sniff_delimiter, split_payload, DelimitedFileSource, RowSource, WebSource, WebSourceOptions,
};

#[cfg(test)]
mod tests;
