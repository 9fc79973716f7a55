#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factorbt/factorbt/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod panel;
pub mod portfolio;
pub mod reconcile;
pub mod regress;
pub mod report;
pub mod sort;
pub mod stats;

// Re-export core types
pub use analyzer::{AnalysisResult, PeriodDiagnostic};
pub use config::{BacktestConfig, IcMethod, Weighting};
pub use engine::Engine;
pub use error::{BacktestError, Result};
pub use panel::{CrossSection, PanelEntry};
pub use reconcile::{DailyPrices, DailyReturnSeries};
pub use report::{PortfolioReport, PortfolioTag, SummaryReport};
pub use sort::BucketAssignment;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
