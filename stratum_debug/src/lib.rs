// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing and JSON dumps for stratum diagnostics.
//!
//! This crate provides tools for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: a [`TraceSink`](stratum_core::trace::TraceSink)
//!   writing one human-readable line per event.
//! - [`json`]: snapshots of [`PropertyTrees`](stratum_core::property_trees::PropertyTrees)
//!   and committed layer trees as `serde_json` values.

pub mod json;
pub mod pretty;
