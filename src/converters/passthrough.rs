//! Code and plain-text files: carried into the output directory as-is.

use super::{Converter, OutputDir};
use crate::config::PassthroughMode;
use crate::error::ConvertError;
use crate::output::{ConversionResult, InputFile};
use crate::pipeline::naming::unique_output_name;
use std::borrow::Cow;
use tracing::debug;

pub struct PassthroughConverter {
    mode: PassthroughMode,
}

impl PassthroughConverter {
    pub fn new(mode: PassthroughMode) -> Self {
        Self { mode }
    }
}

impl Converter for PassthroughConverter {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn convert(&self, input: &InputFile, out: &OutputDir) -> ConversionResult {
        let bytes = match std::fs::read(&input.path) {
            Ok(bytes) => bytes,
            Err(e) => return ConversionResult::Failed(ConvertError::io(&input.path, e)),
        };

        let contents: Cow<'_, [u8]> = match self.mode {
            PassthroughMode::Copy => Cow::Borrowed(&bytes),
            PassthroughMode::Utf8 => match String::from_utf8_lossy(&bytes) {
                Cow::Borrowed(_) => Cow::Borrowed(&bytes),
                Cow::Owned(fixed) => {
                    debug!("{}: replaced invalid UTF-8 sequences", input.path.display());
                    Cow::Owned(fixed.into_bytes())
                }
            },
        };

        let name = unique_output_name(&input.path, &input.extension);
        match out.write_artifact(&name, &contents) {
            Ok(path) => ConversionResult::Success(vec![path]),
            Err(e) => ConversionResult::Failed(ConvertError::io(&input.path, e)),
        }
    }
}
