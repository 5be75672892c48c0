//! Shared helpers for the goser integration suites.

pub mod helpers;
