//! Host-side test suite.
//!
//! Split by concern rather than by source module: [`unit`] drives the
//! scheduler's public entry points in isolation, [`integration`] scripts the
//! multi-thread scenarios from the design notes (donation chains, lock
//! hand-off, MLFQS cadence), [`property`] checks invariants that should hold
//! for arbitrary thread populations, and [`stress`] hammers thread/page
//! churn and deep donation chains. [`helpers`] holds what they share.

mod helpers;
mod integration;
mod unit;
