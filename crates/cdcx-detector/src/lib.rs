//! Opportunity detection for cdcx-arb.
//!
//! - [`OpportunityDetector`]: top-of-book comparison of every market pair in a group
//! - [`depth::simulate`]: pure merge-walk of two normalized books into profitable fills
//! - [`DepthAnalyzer`]: fetches both books and runs the simulator
//! - [`Revalidator`]: decision-time re-check of one opportunity against fresh books

pub mod config;
pub mod depth;
pub mod detector;
pub mod error;
pub mod revalidator;

pub use config::{DetectorConfig, RevalidationConfig};
pub use depth::{
    simulate, BottleneckSide, DepthAnalysis, DepthAnalyzer, DepthRating, DepthSimulationResult,
    SimulatedFill, StopReason,
};
pub use detector::{evaluate_pair, OpportunityDetector};
pub use error::{DetectorError, DetectorResult};
pub use revalidator::{RealTimeOpportunity, RejectKind, Revalidator};
