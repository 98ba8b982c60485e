//! Random instances for experiments, demos and benchmarks.

pub mod instance_generator;
