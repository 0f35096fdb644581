//! Built-in tree passes.

pub mod fusion;
pub mod printer;
pub mod removal;

pub use fusion::{fuse_steps, FusionPass};
pub use printer::PrinterPass;
pub use removal::RemovalPass;
