//! Testing utilities for deployflow pipelines.
//!
//! This module provides:
//! - A scripted provider implementing every capability
//! - Pipeline document fixtures
//! - Assertions over plans and run results

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_all_succeeded, assert_node_status, assert_plan_respects_edges, assert_skipped_because,
};
pub use fixtures::{
    any_of_source_document, original_stack_document, resource_stack_document,
    three_stage_document, ANY_OF_SOURCE_YAML, ORIGINAL_STACK_YAML, RESOURCE_STACK_YAML,
    THREE_STAGE_YAML,
};
pub use mocks::{ProviderCall, ScriptedProvider};
