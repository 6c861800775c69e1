//! Update analysis.
//!
//! [`service`] talks to the analysis API, [`analyzer`] turns its output into
//! assessments.

pub mod analyzer;
pub mod service;

pub use analyzer::UpdateAnalyzer;
pub use service::AnalysisService;
