//! SweepLab Core: parameter spaces, signal matrices, exit simulation and
//! the reference portfolio engine.
//!
//! This crate contains the compute side of a parameter sweep:
//! - Domain types (bars, price series, signal matrices, entry/exit sets)
//! - Parameter-space declaration, expansion and resumable batching
//! - Exit Simulator (take-profit / stop-loss scan per column)
//! - TP/SL grid and fast-path grid expansion
//! - Indicators and the batch `SignalGenerator` trait with built-in strategies
//! - Signal-driven reference portfolio simulation

pub mod domain;
pub mod engine;
pub mod exits;
pub mod grid;
pub mod indicators;
pub mod params;
pub mod signals;
