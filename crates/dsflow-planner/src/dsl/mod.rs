//! Declarative pipeline front-ends.

pub mod yaml;
