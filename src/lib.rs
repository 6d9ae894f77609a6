//! stampa: a small, self-hosted HTTP gateway that renders posted markup to
//! PDF by orchestrating an external renderer binary as a subprocess.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
