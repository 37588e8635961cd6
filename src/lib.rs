//! plumb: assemble bundles into a data pipeline and stream requests through it
//!
//! A pipeline is a set of bundle descriptors. [`graph`] joins them into a
//! producer to consumer graph and sorts it; [`runtime`] starts one container
//! per bundle and tears them down again; [`server`] is the pipeline manager
//! that walks each request through the running stages.

pub mod cli;
pub mod client;
pub mod config;
pub mod graph;
pub mod runtime;
pub mod server;
