//! Shared infrastructure for the umbra workspace.

#[macro_use]
pub mod macros;
pub mod cpu_features;

pub use cpu_features::SimdLevel;
