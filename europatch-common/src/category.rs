//! Module category table
//!
//! Fixed keyword-to-category table used to classify a module when its page
//! carries no explicit type element. Categories are checked in table order and
//! the first keyword hit wins, so a page mentioning both "VCO" and "filter" is
//! an Oscillator.

use serde::{Deserialize, Serialize};

/// Categorical module type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleCategory {
    Oscillator,
    Filter,
    Envelope,
    #[serde(rename = "LFO")]
    Lfo,
    #[serde(rename = "VCA")]
    Vca,
    Sequencer,
    Utility,
    Effect,
    Unknown,
}

/// Keyword table in match priority order (keywords are lowercase)
const KEYWORD_TABLE: &[(ModuleCategory, &[&str])] = &[
    (ModuleCategory::Oscillator, &["vco", "oscillator"]),
    (ModuleCategory::Filter, &["vcf", "filter"]),
    (ModuleCategory::Envelope, &["envelope", "adsr"]),
    (ModuleCategory::Lfo, &["lfo"]),
    (ModuleCategory::Vca, &["vca", "amplifier"]),
    (ModuleCategory::Sequencer, &["sequencer"]),
    (ModuleCategory::Utility, &["utility", "mixer", "attenuator", "multiple"]),
    (ModuleCategory::Effect, &["effect", "reverb", "delay", "granular"]),
];

/// Short class names that only count as whole tokens
const CLASS_ALIASES: &[(&str, ModuleCategory)] = &[("fx", ModuleCategory::Effect)];

impl ModuleCategory {
    /// Display name stored in `modules.module_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleCategory::Oscillator => "Oscillator",
            ModuleCategory::Filter => "Filter",
            ModuleCategory::Envelope => "Envelope",
            ModuleCategory::Lfo => "LFO",
            ModuleCategory::Vca => "VCA",
            ModuleCategory::Sequencer => "Sequencer",
            ModuleCategory::Utility => "Utility",
            ModuleCategory::Effect => "Effect",
            ModuleCategory::Unknown => "Unknown",
        }
    }

    /// Classify free text by substring search against the keyword table
    ///
    /// Returns `Unknown` only when no keyword matches.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        KEYWORD_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|(category, _)| *category)
            .unwrap_or(ModuleCategory::Unknown)
    }

    /// Classify a whitespace-separated class attribute by whole-token match
    ///
    /// Returns `None` when no token names a category.
    pub fn from_class_tokens(classes: &str) -> Option<Self> {
        classes
            .split_whitespace()
            .map(str::to_lowercase)
            .find_map(|token| {
                KEYWORD_TABLE
                    .iter()
                    .find(|(_, keywords)| keywords.iter().any(|kw| *kw == token))
                    .map(|(category, _)| *category)
                    .or_else(|| {
                        CLASS_ALIASES
                            .iter()
                            .find(|(alias, _)| *alias == token)
                            .map(|(_, category)| *category)
                    })
            })
    }
}

impl std::fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
