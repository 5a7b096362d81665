//! wayscene compositor core
//!
//! Scene graph, render passes with direct scanout, toplevel transactions and
//! animation hooks. The crate has no Wayland socket of its own: clients are
//! reached through [`toplevel::ToplevelClient`], which a protocol backend or
//! the test harness implements.

pub mod animate;
pub mod arena;
pub mod buffer;
pub mod config;
pub mod event_loop;
pub mod geometry;
pub mod output;
pub mod plugin;
pub mod region;
pub mod render;
pub mod scene;
pub mod state;
pub mod toplevel;
pub mod txn;
pub mod view;

pub use state::{AnimationStart, Clock, WayScene};
