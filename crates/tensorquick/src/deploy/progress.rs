//! Deployment progress extraction from deploy tool output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());

/// Known points in a deployment, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Starting = 1,
    Uploading = 2,
    Building = 3,
    Deploying = 4,
    Complete = 5,
}

impl Milestone {
    pub const ALL: [Milestone; 5] = [
        Milestone::Starting,
        Milestone::Uploading,
        Milestone::Building,
        Milestone::Deploying,
        Milestone::Complete,
    ];

    /// Share of the deployment done once this milestone is reached.
    pub fn percent(self) -> u8 {
        (self as u16 * 100 / Self::ALL.len() as u16) as u8
    }
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Milestone::Starting => write!(f, "Starting"),
            Milestone::Uploading => write!(f, "Uploading"),
            Milestone::Building => write!(f, "Building"),
            Milestone::Deploying => write!(f, "Deploying"),
            Milestone::Complete => write!(f, "Complete"),
        }
    }
}

// First match wins
const MILESTONE_MARKERS: [(&str, Milestone); 5] = [
    ("Starting deployment", Milestone::Starting),
    ("Uploading code", Milestone::Uploading),
    ("Building container", Milestone::Building),
    ("Deploying model", Milestone::Deploying),
    ("Deployment complete", Milestone::Complete),
];

/// Maps an output line to the milestone it announces, if any.
pub fn classify(line: &str) -> Option<Milestone> {
    MILESTONE_MARKERS
        .iter()
        .find(|(marker, _)| line.contains(marker))
        .map(|(_, milestone)| *milestone)
}

/// The marker the deploy tool prints next to the inference endpoint of
/// `target_id`.
pub fn result_marker(target_id: &str) -> String {
    format!("--{}-model-web-inference", target_id)
}

/// Extracts the deployed endpoint for `target_id` from an output line.
///
/// Only lines carrying the target's result marker are considered, so URLs
/// belonging to other apps in the same output are ignored.
pub fn extract_result_url(line: &str, target_id: &str) -> Option<String> {
    if target_id.is_empty() || !line.contains(&result_marker(target_id)) {
        return None;
    }
    RE_URL.find(line).map(|m| m.as_str().to_string())
}

/// Turns classified lines into a non-decreasing percentage.
#[derive(Debug, Default, Clone)]
pub struct MilestoneTracker {
    reached: Option<Milestone>,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current percentage for a classified line, `None` for
    /// anything else. A milestone seen out of order does not lower it.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        let milestone = classify(line)?;
        let reached = match self.reached {
            Some(current) if current >= milestone => current,
            _ => milestone,
        };
        self.reached = Some(reached);
        Some(reached.percent())
    }

    pub fn reached(&self) -> Option<Milestone> {
        self.reached
    }

    pub fn percent(&self) -> u8 {
        self.reached.map(Milestone::percent).unwrap_or(0)
    }
}
