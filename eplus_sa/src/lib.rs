//! Sampling-and-mutation pipeline for sensitivity studies of building
//! energy models: draws a design of experiments over a fixed parameter
//! schema, writes one model file per sample with a provenance table, and
//! drives the external simulator over the results.

#[macro_use]
extern crate log;

#[macro_use]
extern crate prettytable;

#[macro_use]
extern crate serde_derive;

/// Running mean and variance of realized parameter values.
pub mod accumulate;

/// Collection of the simulator's meter reports into one table.
pub mod aggregate;

/// TOML configuration of a study.
pub mod config;

/// The simulator's data dictionary, used to resolve fields by name.
pub mod dictionary;

pub mod error;

/// Exporters write the provenance of a batch to a data sink.
pub mod export;

/// Building models in the simulator's text format, read once and copied
/// per sample.
pub mod idf;

/// Latin-Hypercube sampling.
pub mod lhs;

/// The mapping from parameters to model fields and its application to a
/// template.
pub mod mutate;

/// Spreading a batch of samples over workers.
pub mod orchestrate;

/// The end-to-end run: sample, mutate, export provenance.
pub mod pipeline;

/// Invocation of the external simulator.
pub mod runner;

pub mod sample;

/// Parameter schema and the heating/cooling setpoint pair.
pub mod schema;

/// Sobol sequences and the Saltelli cross-sampling design.
pub mod sobol;

/// Command-line arguments and logger setup for the `eplus-sa` binary.
pub mod startup;
