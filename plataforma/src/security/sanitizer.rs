use regex::Regex;
use serde::Serialize;

use crate::config::SecurityConfig;

/// A weighted injection pattern. Weights are additive; the total risk score
/// saturates at 100.
struct RiskPattern {
    pattern: &'static str,
    weight: u8,
    reason: &'static str,
}

/// Injection patterns matched against raw queries. The corpus serves a
/// bilingual audience, so override phrasing is covered in both Spanish and
/// English.
const RISK_PATTERNS: &[RiskPattern] = &[
    RiskPattern {
        pattern: r"(?i)\b(ignore|disregard|forget)\b.{0,40}\b(previous|prior|above|all|your)\b.{0,40}\b(instructions?|prompts?|rules?|context)\b",
        weight: 50,
        reason: "instruction_override",
    },
    RiskPattern {
        pattern: r"(?i)\b(ignora|olvida|descarta)\b.{0,40}\b(instrucciones|reglas|indicaciones|contexto)\b",
        weight: 50,
        reason: "instruction_override",
    },
    RiskPattern {
        pattern: r"(?i)\b(reveal|show|print|repeat|display|output|expose)\b.{0,50}\b(system prompt|your (instructions|prompt|rules)|initial prompt|hidden prompt)\b",
        weight: 40,
        reason: "system_prompt_probe",
    },
    RiskPattern {
        pattern: r"(?i)\b(revela|muestra|repite|imprime)\b.{0,50}\b(prompt|instrucciones)\b",
        weight: 40,
        reason: "system_prompt_probe",
    },
    RiskPattern {
        pattern: r"(?i)\b(you are now|act as if|pretend (to be|you are|you're)|roleplay as|simula ser|act[uú]a como si)\b",
        weight: 35,
        reason: "role_escape",
    },
    RiskPattern {
        pattern: r"(?i)\b(jailbreak|dan mode|developer mode|modo desarrollador|sin restricciones)\b",
        weight: 45,
        reason: "jailbreak_marker",
    },
    RiskPattern {
        pattern: r#"(?i)(```|<\|[a-z_]+\|>|</?(system|assistant|user)>|\[/?INST\]|<<SYS>>|###\s*(system|instruction))"#,
        weight: 30,
        reason: "delimiter_breaking",
    },
    RiskPattern {
        pattern: r"(?im)^\s*(system|assistant)\s*:",
        weight: 30,
        reason: "role_spoofing",
    },
];

const EXCESSIVE_LENGTH_WEIGHT: u8 = 25;
const CONTROL_CHAR_WEIGHT: u8 = 10;

/// Outcome of a risk scan over one raw query. Consumed immediately by the
/// query processor; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizationResult {
    pub sanitized: String,
    pub risk_score: u8,
    pub reasons: Vec<String>,
    pub suspicious: bool,
    pub blocked: bool,
}

/// Pure, synchronous injection scanner. No network calls; deterministic for
/// a given pattern set and configuration, which keeps it unit-testable.
pub struct QuerySanitizer {
    patterns: Vec<(Regex, u8, &'static str)>,
    block_threshold: u8,
    suspicious_threshold: u8,
    max_query_length: usize,
}

impl QuerySanitizer {
    pub fn new(config: &SecurityConfig) -> Self {
        let patterns = RISK_PATTERNS
            .iter()
            .map(|p| {
                let regex = Regex::new(p.pattern)
                    .unwrap_or_else(|e| panic!("invalid risk pattern '{}': {e}", p.reason));
                (regex, p.weight, p.reason)
            })
            .collect();

        Self {
            patterns,
            block_threshold: config.block_threshold,
            suspicious_threshold: config.suspicious_threshold,
            max_query_length: config.max_query_length,
        }
    }

    pub fn sanitize(&self, raw: &str) -> SanitizationResult {
        let mut score: u32 = 0;
        let mut reasons: Vec<String> = Vec::new();

        let sanitized: String = raw
            .chars()
            .filter(|c| !c.is_control() || *c == '\n')
            .collect();
        if sanitized.len() != raw.len() {
            score += u32::from(CONTROL_CHAR_WEIGHT);
            reasons.push("control_characters".to_string());
        }

        for (regex, weight, reason) in &self.patterns {
            if regex.is_match(&sanitized) && !reasons.iter().any(|r| r == reason) {
                score += u32::from(*weight);
                reasons.push((*reason).to_string());
            }
        }

        if sanitized.chars().count() > self.max_query_length {
            score += u32::from(EXCESSIVE_LENGTH_WEIGHT);
            reasons.push("excessive_length".to_string());
        }

        let risk_score = score.min(100) as u8;

        SanitizationResult {
            sanitized,
            risk_score,
            reasons,
            suspicious: risk_score >= self.suspicious_threshold,
            blocked: risk_score >= self.block_threshold,
        }
    }

    pub fn should_block(&self, result: &SanitizationResult) -> bool {
        result.risk_score >= self.block_threshold
    }
}
