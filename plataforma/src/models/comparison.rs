use serde::{Deserialize, Serialize};

use super::SourceRef;

/// Quality label assigned to one party's answer in a comparison. Labels are
/// kept in the corpus language since they are user-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    /// Substantial answer backed by multiple sources at high confidence
    Completa,
    /// Usable answer with at least one source at moderate confidence
    Parcial,
    /// Weak signal; answer exists but should be presented with caveats
    PocoClara,
    /// Nothing retrievable for this party and topic
    SinInformacion,
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completa => write!(f, "completa"),
            Self::Parcial => write!(f, "parcial"),
            Self::PocoClara => write!(f, "poco_clara"),
            Self::SinInformacion => write!(f, "sin_informacion"),
        }
    }
}

/// One party's independently generated entry in a comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyComparison {
    pub party_id: String,
    pub party_name: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
    pub state: ProposalState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub topic: String,
    pub comparisons: Vec<PartyComparison>,
    pub from_cache: bool,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(to_value(ProposalState::Completa).unwrap(), json!("completa"));
        assert_eq!(
            to_value(ProposalState::SinInformacion).unwrap(),
            json!("sin_informacion")
        );
        assert_eq!(
            to_value(ProposalState::PocoClara).unwrap(),
            json!("poco_clara")
        );
    }

    #[test]
    fn test_state_display_matches_serialization() {
        for state in [
            ProposalState::Completa,
            ProposalState::Parcial,
            ProposalState::PocoClara,
            ProposalState::SinInformacion,
        ] {
            let display = state.to_string();
            let serialized = to_value(state).unwrap();
            assert_eq!(serialized, json!(display));
        }
    }
}
