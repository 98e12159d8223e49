use {
    super::error::CoreError,
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
    std::fmt,
};

/// Saturation at or above this is HIGH_LOAD regardless of the node's own
/// redirect threshold.
pub const HIGH_LOAD_THRESHOLD: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationLevel {
    Basic,
    Advanced,
    Master,
}

impl CertificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
            Self::Master => "master",
        }
    }
}

impl fmt::Display for CertificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CertificationLevel {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            "master" => Ok(Self::Master),
            other => Err(CoreError::Validation(format!(
                "unknown certification level: {other}"
            ))),
        }
    }
}

/// Level → routing score mapping, loaded from reference data and injected
/// here. Tunable without touching the ranking logic.
#[derive(Debug, Clone)]
pub struct WeightPolicy {
    weights: HashMap<String, f64>,
}

impl WeightPolicy {
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self { weights }
    }

    /// Unknown levels score zero so they sort last, not crash routing.
    pub fn weight_for(&self, level: &CertificationLevel) -> f64 {
        self.weights.get(level.as_str()).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    Available,
    HighLoad,
    Saturated,
}

/// A provider node snapshot as loaded from reference data, already filtered
/// for eligibility (active, certified, tourism-enabled, valid certification
/// for the procedure, international acceptance when required).
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub name: String,
    pub location: String,
    pub weekly_capacity: i32,
    pub weekly_booked: i32,
    pub redirect_threshold: f64,
    pub certification_level: CertificationLevel,
    pub sla_response_minutes: i32,
    pub margin_factor: f64,
}

/// Ranked routing answer for one node.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub node_id: String,
    pub name: String,
    pub location: String,
    pub saturation: f64,
    pub load_status: LoadStatus,
    pub certification_level: CertificationLevel,
    pub certification_weight: f64,
    pub sla_response_minutes: i32,
    pub margin_factor: f64,
}

/// booked/capacity, with zero capacity defined as fully saturated rather
/// than a division error.
pub fn saturation(weekly_booked: i32, weekly_capacity: i32) -> f64 {
    if weekly_capacity <= 0 {
        return 1.0;
    }
    f64::from(weekly_booked) / f64::from(weekly_capacity)
}

pub fn classify_load(saturation: f64, redirect_threshold: f64, weekly_capacity: i32) -> LoadStatus {
    if weekly_capacity <= 0 || saturation >= redirect_threshold {
        LoadStatus::Saturated
    } else if saturation >= HIGH_LOAD_THRESHOLD {
        LoadStatus::HighLoad
    } else {
        LoadStatus::Available
    }
}

/// Rank eligible nodes: saturation ascending, certification weight
/// descending, SLA response ascending. The sort is stable, so ties keep
/// input order and repeated calls over the same snapshot return the same
/// list.
pub fn rank(nodes: Vec<NodeSnapshot>, policy: &WeightPolicy) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = nodes
        .into_iter()
        .map(|n| {
            let saturation = saturation(n.weekly_booked, n.weekly_capacity);
            let load_status = classify_load(saturation, n.redirect_threshold, n.weekly_capacity);
            Candidate {
                node_id: n.node_id,
                name: n.name,
                location: n.location,
                saturation,
                load_status,
                certification_level: n.certification_level,
                certification_weight: policy.weight_for(&n.certification_level),
                sla_response_minutes: n.sla_response_minutes,
                margin_factor: n.margin_factor,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.saturation
            .total_cmp(&b.saturation)
            .then_with(|| b.certification_weight.total_cmp(&a.certification_weight))
            .then_with(|| a.sla_response_minutes.cmp(&b.sla_response_minutes))
    });

    candidates
}
