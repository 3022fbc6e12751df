//! Built-in speech providers.
//!
//! Network- or browser-backed providers live in downstream crates and are
//! registered through [`crate::ProviderFactory::register`]; only fully
//! local backends ship here.

pub mod tone;
