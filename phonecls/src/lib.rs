//! phonecls: command-line front end for phonecls-core.

pub mod align;
pub mod cli;
pub mod config;
pub mod train;
