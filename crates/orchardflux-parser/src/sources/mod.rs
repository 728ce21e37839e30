mod delimited;
mod web;

pub use delimited::{parse_delimited, sniff_delimiter, DelimitedFileSource};
pub use web::{split_payload, WebSource, WebSourceOptions};

use crate::errors::SourceError;
use crate::model::RawRow;

/// Produces raw rows for a location. Implementations never convert types;
/// every value comes back as the text found in the source.
pub trait RowSource {
    fn name(&self) -> &'static str;
    fn rows(&self, location: &str, field_names: &[String]) -> Result<Vec<RawRow>, SourceError>;
}

pub(crate) fn zip_row<'a, I>(field_names: &[String], values: I) -> RawRow
where
    I: IntoIterator<Item = &'a str>,
{
    field_names
        .iter()
        .cloned()
        .zip(values.into_iter().map(str::to_string))
        .collect()
}
