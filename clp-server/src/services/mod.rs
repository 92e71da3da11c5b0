//! Background services

pub mod generation;

pub use generation::{run_generation, spawn_generation, GenerationRequest};
