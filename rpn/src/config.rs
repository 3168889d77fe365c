//! Region proposal configuration format.

use crate::{
    anchor::{AnchorGeneratorInit, PyramidLevel},
    assign::TargetAssignerInit,
    common::*,
    pipeline::{RegionProposal, RegionProposalInit},
    proposal::ProposalSelectorInit,
    sample::MinibatchSamplerInit,
};

/// The main region proposal configuration.
///
/// Missing sections and fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RpnConfig {
    pub anchor: AnchorConfig,
    pub assign: AssignConfig,
    pub sample: SampleConfig,
    pub proposal: ProposalConfig,
    pub codec: CodecConfig,
}

impl RpnConfig {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file '{}'", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("unable to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn build(&self) -> Result<RegionProposal> {
        let Self {
            anchor,
            assign,
            sample,
            proposal,
            codec,
        } = self.clone();

        RegionProposalInit {
            anchor: anchor.into(),
            assign: assign.into(),
            sample: sample.into(),
            proposal: proposal.into(),
            scale_factors: codec.scale_factors.map(|factor| factor.raw()),
        }
        .build()
    }
}

/// Anchor grid options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub levels: Vec<PyramidLevel>,
    pub scales: Vec<R64>,
    pub ratios: Vec<R64>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        let AnchorGeneratorInit {
            levels,
            scales,
            ratios,
        } = AnchorGeneratorInit::default();
        Self {
            levels,
            scales,
            ratios,
        }
    }
}

impl From<AnchorConfig> for AnchorGeneratorInit {
    fn from(from: AnchorConfig) -> Self {
        let AnchorConfig {
            levels,
            scales,
            ratios,
        } = from;
        Self {
            levels,
            scales,
            ratios,
        }
    }
}

/// Anchor labeling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignConfig {
    pub positive_iou_threshold: R64,
    pub negative_iou_threshold: R64,
}

impl Default for AssignConfig {
    fn default() -> Self {
        let TargetAssignerInit {
            positive_iou_threshold,
            negative_iou_threshold,
        } = TargetAssignerInit::default();
        Self {
            positive_iou_threshold,
            negative_iou_threshold,
        }
    }
}

impl From<AssignConfig> for TargetAssignerInit {
    fn from(from: AssignConfig) -> Self {
        Self {
            positive_iou_threshold: from.positive_iou_threshold,
            negative_iou_threshold: from.negative_iou_threshold,
        }
    }
}

/// Minibatch sampling options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub minibatch_size: usize,
    pub positive_fraction: R64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        let MinibatchSamplerInit {
            minibatch_size,
            positive_fraction,
        } = MinibatchSamplerInit::default();
        Self {
            minibatch_size,
            positive_fraction,
        }
    }
}

impl From<SampleConfig> for MinibatchSamplerInit {
    fn from(from: SampleConfig) -> Self {
        Self {
            minibatch_size: from.minibatch_size,
            positive_fraction: from.positive_fraction,
        }
    }
}

/// Proposal selection options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    pub nms_iou_threshold: R64,
    /// Set to `null` to keep every anchor before suppression.
    pub pre_nms_top_k: Option<usize>,
    pub max_proposals_training: usize,
    pub max_proposals_inference: usize,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        let ProposalSelectorInit {
            nms_iou_threshold,
            pre_nms_top_k,
            max_proposals_training,
            max_proposals_inference,
        } = ProposalSelectorInit::default();
        Self {
            nms_iou_threshold,
            pre_nms_top_k,
            max_proposals_training,
            max_proposals_inference,
        }
    }
}

impl From<ProposalConfig> for ProposalSelectorInit {
    fn from(from: ProposalConfig) -> Self {
        let ProposalConfig {
            nms_iou_threshold,
            pre_nms_top_k,
            max_proposals_training,
            max_proposals_inference,
        } = from;
        Self {
            nms_iou_threshold,
            pre_nms_top_k,
            max_proposals_training,
            max_proposals_inference,
        }
    }
}

/// Box delta encoding options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Divisors of the `[dy, dx, dh, dw]` components.
    pub scale_factors: [R64; 4],
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            scale_factors: [r64(0.1), r64(0.1), r64(0.2), r64(0.2)],
        }
    }
}
