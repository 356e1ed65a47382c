//! Content cache construction and merge engine for a sensor observation
//! service.
//!
//! A rebuild reads every offering, procedure, observable property, feature
//! of interest and result template from a [`application::repos::ContentStore`],
//! aggregates them into a [`cache::ContentCache`] using a pool of worker
//! threads, and publishes the result as an immutable snapshot that readers
//! query through [`cache::ReadableCache`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
