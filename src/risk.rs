use regex::Regex;

use crate::models::RiskTier;

/// Pattern-based command risk scoring. Three ordered tiers, first match wins,
/// anything unmatched lands on Medium. Stateless and deterministic.
pub struct RiskAssessor {
    critical: Vec<Regex>,
    high: Vec<Regex>,
    low: Vec<Regex>,
}

impl RiskAssessor {
    pub fn new(
        critical: &[String],
        high: &[String],
        low: &[String],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            critical: compile(critical)?,
            high: compile(high)?,
            low: compile(low)?,
        })
    }

    pub fn assess(&self, command: &str) -> RiskTier {
        if self.critical.iter().any(|re| re.is_match(command)) {
            RiskTier::Critical
        } else if self.high.iter().any(|re| re.is_match(command)) {
            RiskTier::High
        } else if self.low.iter().any(|re| re.is_match(command)) {
            RiskTier::Low
        } else {
            RiskTier::Medium
        }
    }
}

/// The allow-list consulted for auto-approval. Kept separate from the risk
/// tiers: a low-risk command still needs an explicit safe pattern to skip
/// manual review.
pub struct SafePatterns {
    patterns: Vec<Regex>,
}

impl SafePatterns {
    pub fn new(patterns: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: compile(patterns)?,
        })
    }

    pub fn matches(&self, command: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(command))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}
