// src/report/mod.rs

//! Reporting: the post-run debrief and graph export.

pub mod debrief;
pub mod export;

pub use debrief::{ExecutionReport, JobReport};
pub use export::{export_dot, export_graph, export_png, to_dot};
