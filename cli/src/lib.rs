//! Command-line front end for the staking dashboard and admin console.

pub mod cli;
pub mod config;
pub mod handlers;
