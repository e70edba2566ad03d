//! Default prompt templates bundled at compile time.

use crate::specialists::SpecialistKind;

/// Intent planner - selects specialists and phrases sub-questions
pub const PLANNER: &str = include_str!("defaults/planner.md");

/// Synthesizer - merges findings into the final answer
pub const SYNTHESIZER: &str = include_str!("defaults/synthesizer.md");

/// Lookup key - extracts the therapy area, molecule, or document id
pub const LOOKUP_KEY: &str = include_str!("defaults/lookup_key.md");

pub const MARKET_INTELLIGENCE: &str = include_str!("defaults/market_intelligence.md");
pub const PATENT: &str = include_str!("defaults/patent.md");
pub const CLINICAL_TRIALS: &str = include_str!("defaults/clinical_trials.md");
pub const TRADE: &str = include_str!("defaults/trade.md");
pub const INTERNAL_KNOWLEDGE: &str = include_str!("defaults/internal_knowledge.md");
pub const WEB_RESEARCH: &str = include_str!("defaults/web_research.md");

/// System prompt for a specialist's analysis step
pub fn specialist(kind: SpecialistKind) -> &'static str {
    match kind {
        SpecialistKind::MarketIntelligence => MARKET_INTELLIGENCE,
        SpecialistKind::Patent => PATENT,
        SpecialistKind::ClinicalTrials => CLINICAL_TRIALS,
        SpecialistKind::Trade => TRADE,
        SpecialistKind::InternalKnowledge => INTERNAL_KNOWLEDGE,
        SpecialistKind::WebResearch => WEB_RESEARCH,
    }
}
