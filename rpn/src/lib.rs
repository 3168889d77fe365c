//! Anchor matching and proposal generation for two-stage detectors.
//!
//! The crate turns a feature pyramid shape into a dense anchor grid, labels
//! the anchors against ground truth boxes for training, samples balanced
//! minibatches and converts raw per-anchor predictions into a fixed number
//! of region proposals.

mod common;
pub mod anchor;
pub mod assign;
pub mod config;
pub mod overlap;
pub mod pipeline;
pub mod proposal;
pub mod sample;

pub use anchor::*;
pub use assign::*;
pub use config::*;
pub use overlap::*;
pub use pipeline::*;
pub use proposal::*;
pub use sample::*;

/// A class-labeled ground truth box.
pub type GroundTruth = label::Label<bbox::TLBR<f64>, usize>;
