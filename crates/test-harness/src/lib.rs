//! Test harness for wayscene
//!
//! Drives the compositor core headlessly: a manual clock, a software output
//! and scripted clients.
//!
//! # Modules
//!
//! - `headless`: `TestCompositor`, a `WayScene` with one output and a manual clock
//! - `client`: mock toplevel clients that record configure requests
//! - `assertions`: pixel, geometry and damage assertions
//! - `fixtures`: ready-made compositors with mapped views

pub mod assertions;
pub mod client;
pub mod fixtures;
pub mod headless;

pub use client::{MockClient, Request};
pub use headless::{TestCompositor, TestError};
