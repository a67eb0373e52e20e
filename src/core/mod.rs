//! Header detection and transformation engine

pub mod builtin;
pub mod catalog;
pub mod definition;
pub mod detector;
pub mod error;
pub mod headerer;
pub mod offset;
pub mod rule;
pub mod store;
pub mod transform;
