//! Deterministic intent resolution.
//!
//! Maps free-text requests to a task role through an explicitly ordered rule
//! list: first match wins. The rule set sits behind [`IntentStrategy`] so it
//! can be swapped without touching the router or dispatcher.
//!
//! Keyword categories carry both English and Arabic variants; the product
//! serves both languages and each category must match in either.

use crate::types::AgentRole;
use serde::{Deserialize, Serialize};

/// Outcome of intent resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResolution {
    /// The resolved task role.
    pub role: AgentRole,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Human-readable explanation of which rule fired.
    pub reason: String,
}

/// Light context accompanying a message.
#[derive(Debug, Clone, Default)]
pub struct IntentContext {
    /// Path of a file the user attached, if any.
    pub attached_file: Option<String>,
    /// Role resolved for the previous turn of the same conversation.
    pub previous_role: Option<AgentRole>,
}

/// Strategy seam for intent resolution.
///
/// The default implementation is [`RuleBasedResolver`]; a future learned
/// classifier can replace it behind this trait.
pub trait IntentStrategy: Send + Sync {
    /// Resolves a message (plus light context) to a task role.
    fn resolve(&self, message: &str, context: &IntentContext) -> IntentResolution;
}

const COMPLEX_ANALYSIS_KEYWORDS: &[&str] = &[
    "analyze",
    "analysis",
    "architecture",
    "compare",
    "trade-off",
    "tradeoff",
    "performance",
    "scalability",
    "حلل",
    "تحليل",
    "معمارية",
    "قارن",
    "أداء",
];

const CODE_REVIEW_KEYWORDS: &[&str] = &[
    "review",
    "bug",
    "fix",
    "debug",
    "error",
    "broken",
    "راجع",
    "مراجعة",
    "صحح",
    "خطأ",
    "مشكلة",
];

const CODE_GENERATION_KEYWORDS: &[&str] = &[
    "write code",
    "implement",
    "function",
    "endpoint",
    "component",
    "script",
    "اكتب كود",
    "برمج",
    "دالة",
    "سكريبت",
];

const PLANNING_KEYWORDS: &[&str] = &[
    "plan",
    "roadmap",
    "strategy",
    "milestone",
    "launch",
    "خطة",
    "خارطة طريق",
    "استراتيجية",
    "إطلاق",
    "اطلاق",
];

const UX_IDEATION_KEYWORDS: &[&str] = &[
    "design",
    "ui",
    "ux",
    "layout",
    "wireframe",
    "user experience",
    "تصميم",
    "واجهة",
    "تجربة المستخدم",
];

const GREETING_KEYWORDS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "thanks",
    "thank you",
    "مرحبا",
    "هلا",
    "اهلا",
    "أهلا",
    "شكرا",
];

const FILE_ANALYSIS_PHRASES: &[&str] = &["analyze this file", "حلل هذا الملف"];

/// Ordered, deterministic rule-based resolver.
#[derive(Debug, Clone)]
pub struct RuleBasedResolver {
    /// Messages longer than this (in characters) resolve to complex analysis
    /// when no stronger signal fires.
    long_message_threshold: usize,
}

impl Default for RuleBasedResolver {
    fn default() -> Self {
        Self { long_message_threshold: 3000 }
    }
}

impl RuleBasedResolver {
    /// Creates a resolver with the default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyword match against a category, case-insensitive.
    ///
    /// Single-word keywords match on word boundaries so short entries like
    /// "hi" or "ui" cannot fire inside unrelated words ("this", "build");
    /// phrases match as substrings.
    fn matches_any(lower: &str, keywords: &[&str]) -> bool {
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        keywords.iter().any(|kw| {
            if kw.chars().any(|c| !c.is_alphanumeric()) {
                lower.contains(kw)
            } else {
                words.iter().any(|w| w == kw)
            }
        })
    }

    fn resolution(role: AgentRole, confidence: f64, reason: &str) -> IntentResolution {
        IntentResolution { role, confidence, reason: reason.to_string() }
    }
}

impl IntentStrategy for RuleBasedResolver {
    fn resolve(&self, message: &str, context: &IntentContext) -> IntentResolution {
        let lower = message.to_lowercase();

        // 1. Explicit file-analysis signal.
        if context.attached_file.is_some() || Self::matches_any(&lower, FILE_ANALYSIS_PHRASES) {
            return Self::resolution(AgentRole::CodeReview, 0.97, "file analysis signal");
        }

        // 2. A fenced or inline code block means a code task; review
        //    keywords decide which one.
        let has_code_block =
            message.contains("```") || message.matches('`').count() >= 2;
        if has_code_block {
            return if Self::matches_any(&lower, CODE_REVIEW_KEYWORDS) {
                Self::resolution(AgentRole::CodeReview, 0.92, "code block with review intent")
            } else {
                Self::resolution(AgentRole::CodeGeneration, 0.9, "code block present")
            };
        }

        // 3. Very long messages with no stronger signal are analysis work.
        if message.chars().count() > self.long_message_threshold {
            return Self::resolution(
                AgentRole::ComplexAnalysis,
                0.85,
                "long message without stronger signal",
            );
        }

        // 4. Domain keyword categories, in fixed precedence order.
        if Self::matches_any(&lower, COMPLEX_ANALYSIS_KEYWORDS) {
            return Self::resolution(AgentRole::ComplexAnalysis, 0.9, "analysis keywords");
        }
        if Self::matches_any(&lower, CODE_REVIEW_KEYWORDS) {
            return Self::resolution(AgentRole::CodeReview, 0.85, "review keywords");
        }
        if Self::matches_any(&lower, CODE_GENERATION_KEYWORDS) {
            return Self::resolution(AgentRole::CodeGeneration, 0.85, "code generation keywords");
        }
        if Self::matches_any(&lower, PLANNING_KEYWORDS) {
            return Self::resolution(AgentRole::Planning, 0.8, "planning keywords");
        }
        if Self::matches_any(&lower, UX_IDEATION_KEYWORDS) {
            return Self::resolution(AgentRole::UxIdeation, 0.78, "design keywords");
        }
        if Self::matches_any(&lower, GREETING_KEYWORDS) {
            return Self::resolution(AgentRole::LightChat, 0.85, "greeting");
        }

        // 5. Nothing matched: stay with the conversation's previous role,
        //    unless that role was the safe fallback.
        if let Some(previous) = context.previous_role {
            if previous != AgentRole::SafeFallback {
                return Self::resolution(previous, 0.5, "continuing previous conversation role");
            }
        }

        // 6. Default.
        Self::resolution(AgentRole::LightChat, 0.6, "no signal, defaulting to chat")
    }
}
