//! Utilities for integration tests.
//!
//! The `test-util` crate provides API descriptions together with small
//! `axum` servers that implement them, either correctly or with a planted
//! defect, plus helpers to run those servers on ephemeral ports. It is used
//! by the integration tests in the main crate.

pub mod fixtures;
pub mod server;

pub use fixtures::{catalogue_api, items_api, named_items_api};
pub use server::{
    CatalogueBehaviour,
    ItemsBehaviour,
    TestApp,
    catalogue_app,
    items_app,
    named_items_app,
    task_server,
};

/// Error type shared by the test helpers.
pub type AnyError = anyhow::Error;
