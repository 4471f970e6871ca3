//! Configuration loading and construction of the providers, store and
//! pipeline configuration a codelore process runs with.

pub mod bootstrap;
pub mod config;
pub mod secret;

pub use config::Config;
pub use secret::Secret;
