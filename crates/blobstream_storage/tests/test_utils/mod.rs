//! Test utilities for blobstream storage tests.
//!
//! This module provides a recording backend and small helpers.

pub mod mock_backend;

#[allow(unused_imports)]
pub use mock_backend::{MockBackend, MockBehavior};

use blobstream_error::{BlobError, PipelineErrorKind};

/// Pipeline kind of an error, panicking when it is some other category.
#[allow(dead_code)]
pub fn pipeline_kind(error: &BlobError) -> PipelineErrorKind {
    error
        .pipeline_kind()
        .cloned()
        .unwrap_or_else(|| panic!("expected a pipeline error, got {}", error))
}
