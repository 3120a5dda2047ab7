//! CLI subcommands

pub mod collect;
pub mod runs;
