//! Radio mesh relay simulator.
//!
//! Nodes on a plane relay text messages hop by hop over a flat-disk radio
//! model. The `simulation` module holds the core; `common::scene` and
//! `config` load the inputs used by the headless binary.

pub mod common;
pub mod config;
pub mod error;
pub mod simulation;
