//! Cost and turnaround estimates shown before a request is submitted.

use serde::{Deserialize, Serialize};

use super::{ProviderTier, RequestType};

/// What kind of output is being estimated.
///
/// Broader than [`RequestType`]: text and carousels can be quoted even
/// though the pipeline does not produce them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateKind {
    VideoWithVo,
    VideoNoVo,
    Image,
    Text,
    Carousel,
}

impl From<RequestType> for EstimateKind {
    fn from(value: RequestType) -> Self {
        match value {
            RequestType::VideoWithVo => Self::VideoWithVo,
            RequestType::VideoNoVo => Self::VideoNoVo,
            RequestType::Image => Self::Image,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateParams {
    #[serde(rename = "type")]
    pub kind: EstimateKind,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub tier: ProviderTier,
    #[serde(default)]
    pub has_voiceover: bool,
    #[serde(default = "default_true")]
    pub auto_script: bool,
    #[serde(default)]
    pub slide_count: Option<u32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComponent {
    pub component: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub cost: f64,
    pub time_seconds: u64,
    pub breakdown: Vec<CostComponent>,
}

struct TierCosts {
    video_per_second: f64,
    voice_per_second: f64,
    strategy: f64,
    script: f64,
    qa: f64,
}

fn tier_costs(tier: ProviderTier) -> TierCosts {
    match tier {
        ProviderTier::Economy => TierCosts {
            video_per_second: 0.05,
            voice_per_second: 0.01,
            strategy: 0.10,
            script: 0.15,
            qa: 0.05,
        },
        ProviderTier::Standard => TierCosts {
            video_per_second: 0.10,
            voice_per_second: 0.02,
            strategy: 0.20,
            script: 0.25,
            qa: 0.10,
        },
        ProviderTier::Premium => TierCosts {
            video_per_second: 0.20,
            voice_per_second: 0.04,
            strategy: 0.40,
            script: 0.50,
            qa: 0.20,
        },
    }
}

// Seconds of processing.
const STRATEGY_SECS: f64 = 30.0;
const SCRIPT_SECS: f64 = 45.0;
const VIDEO_SECS_PER_SECOND: f64 = 2.0;
const VOICE_SECS_PER_SECOND: f64 = 1.0;
const QA_SECS: f64 = 15.0;

const DEFAULT_DURATION: u32 = 30;
const DEFAULT_SLIDES: u32 = 5;
/// Images are priced as this many seconds of video.
const IMAGE_SECOND_EQUIVALENT: f64 = 5.0;
const TEXT_COST: f64 = 0.05;
const TEXT_SECS: f64 = 5.0;

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub fn estimate(params: &EstimateParams) -> CostEstimate {
    let rates = tier_costs(params.tier);
    let duration = f64::from(params.duration.filter(|d| *d > 0).unwrap_or(DEFAULT_DURATION));
    let slides = f64::from(params.slide_count.unwrap_or(DEFAULT_SLIDES));
    let is_text = params.kind == EstimateKind::Text;

    let (strategy_cost, script_cost) = if params.auto_script {
        (rates.strategy, rates.script)
    } else {
        (0.0, 0.0)
    };
    let voice_cost = if params.has_voiceover {
        duration * rates.voice_per_second
    } else {
        0.0
    };
    let qa_cost = if is_text { 0.0 } else { rates.qa };

    let (output_label, output_cost, output_time) = match params.kind {
        EstimateKind::VideoWithVo | EstimateKind::VideoNoVo => (
            "video generation",
            duration * rates.video_per_second,
            duration * VIDEO_SECS_PER_SECOND,
        ),
        EstimateKind::Image => (
            "image generation",
            rates.video_per_second * IMAGE_SECOND_EQUIVALENT,
            VIDEO_SECS_PER_SECOND * IMAGE_SECOND_EQUIVALENT,
        ),
        EstimateKind::Carousel => (
            "carousel generation",
            rates.video_per_second * slides * 0.1,
            slides * 2.0,
        ),
        EstimateKind::Text => ("text generation", TEXT_COST, TEXT_SECS),
    };

    let mut breakdown = Vec::new();
    let mut push = |component: &str, cost: f64| {
        breakdown.push(CostComponent {
            component: component.to_string(),
            cost: round4(cost),
        })
    };
    if strategy_cost > 0.0 {
        push("strategy", strategy_cost);
    }
    if script_cost > 0.0 {
        push("script generation", script_cost);
    }
    push(output_label, output_cost);
    if voice_cost > 0.0 {
        push("voiceover", voice_cost);
    }
    if qa_cost > 0.0 {
        push("qa", qa_cost);
    }

    let cost = strategy_cost + script_cost + output_cost + voice_cost + qa_cost;

    let mut time = output_time;
    if params.auto_script {
        time += STRATEGY_SECS + SCRIPT_SECS;
    }
    if params.has_voiceover {
        time += duration * VOICE_SECS_PER_SECOND;
    }
    if !is_text {
        time += QA_SECS;
    }

    CostEstimate {
        cost: round4(cost),
        time_seconds: time.round() as u64,
        breakdown,
    }
}

/// Estimate for a request about to be created.
pub fn estimate_request(
    request_type: RequestType,
    duration: Option<u32>,
    tier: ProviderTier,
    auto_script: bool,
) -> CostEstimate {
    estimate(&EstimateParams {
        kind: request_type.into(),
        duration,
        provider: None,
        tier,
        has_voiceover: request_type.has_voiceover(),
        auto_script,
        slide_count: None,
    })
}
