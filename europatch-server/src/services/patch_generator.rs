//! Patch idea generator
//!
//! Rule-based: the prompt is classified into a patch archetype, modules are
//! given roles from their type, and an archetype template of role-to-role
//! steps becomes cables and knob settings. Output is deterministic for a
//! given prompt and module set.

use europatch_common::db::{Module, ModuleConnection, ModuleControl};
use europatch_common::Error;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::db::forum;
use crate::db::modules;
use crate::db::patches::{
    self, NewControlSetting, NewPatchConnection, NewPatchIdea, NewPatchModule, PatchIdeaDetail,
};
use crate::db::racks;

pub const DEFAULT_COMPLEXITY: i64 = 3;

const CABLE_COLORS: &[&str] = &["red", "blue", "yellow", "green", "purple", "orange", "white", "black"];

/// Which modules a patch may use, resolved at the API boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleSelection {
    Rack(i64),
    Modules(Vec<i64>),
}

/// Patch archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    Ambient,
    Generative,
    Percussion,
    Bass,
    Lead,
    Drone,
    Techno,
}

impl PatchType {
    /// Declared order; also the tie-break order for classification
    pub const ALL: [PatchType; 7] = [
        PatchType::Ambient,
        PatchType::Generative,
        PatchType::Percussion,
        PatchType::Bass,
        PatchType::Lead,
        PatchType::Drone,
        PatchType::Techno,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchType::Ambient => "ambient",
            PatchType::Generative => "generative",
            PatchType::Percussion => "percussion",
            PatchType::Bass => "bass",
            PatchType::Lead => "lead",
            PatchType::Drone => "drone",
            PatchType::Techno => "techno",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            PatchType::Ambient => "Ambient",
            PatchType::Generative => "Generative",
            PatchType::Percussion => "Percussion",
            PatchType::Bass => "Bass",
            PatchType::Lead => "Lead",
            PatchType::Drone => "Drone",
            PatchType::Techno => "Techno",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PatchType::Ambient => "Evolving, atmospheric sounds with slow modulation",
            PatchType::Generative => "Self-evolving patches with random elements",
            PatchType::Percussion => "Rhythmic sounds and drum-like patches",
            PatchType::Bass => "Low frequency sounds with punch and presence",
            PatchType::Lead => "Expressive melodic sounds",
            PatchType::Drone => "Sustained, evolving textures",
            PatchType::Techno => "Driving, clock-locked patterns for the dance floor",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            PatchType::Ambient => &["atmospheric", "pad", "texture", "evolving", "spacey", "ethereal"],
            PatchType::Generative => &["random", "evolving", "self-playing", "algorithmic", "chance", "probability"],
            PatchType::Percussion => &["drum", "kick", "snare", "hat", "rhythmic", "beat"],
            PatchType::Bass => &["low", "sub", "808", "acid", "deep"],
            PatchType::Lead => &["melody", "solo", "arpeggio", "sequence", "pluck"],
            PatchType::Drone => &["sustained", "continuous", "dark", "rumble", "noise"],
            PatchType::Techno => &["dance", "club", "groove", "four-on-the-floor", "rave"],
        }
    }

    /// Roles in relevance order
    fn priorities(&self) -> &'static [Role] {
        use Role::*;
        match self {
            PatchType::Ambient => &[SoundSource, Effect, Modulator, Amplifier, Processor],
            PatchType::Generative => &[Sequencer, Clock, Modulator, SoundSource, Effect, Processor],
            PatchType::Percussion => &[SoundSource, Modulator, Amplifier, Effect],
            PatchType::Bass => &[SoundSource, Processor, Amplifier, Modulator],
            PatchType::Lead => &[SoundSource, Processor, Modulator, Effect],
            PatchType::Drone => &[SoundSource, Effect, Processor, Modulator],
            PatchType::Techno => &[Sequencer, SoundSource, Processor, Modulator, Effect],
        }
    }

    /// Roles marked as key modules (importance 5)
    fn key_roles(&self) -> &'static [Role] {
        use Role::*;
        match self {
            PatchType::Ambient => &[Effect, SoundSource],
            PatchType::Generative => &[Sequencer, Clock, Modulator],
            PatchType::Percussion => &[Modulator, SoundSource],
            PatchType::Bass => &[SoundSource, Processor],
            PatchType::Lead => &[SoundSource, Processor],
            PatchType::Drone => &[SoundSource, Effect],
            PatchType::Techno => &[Sequencer, Clock],
        }
    }

    /// Role-to-role cable template, most important first
    fn template(&self) -> &'static [Step] {
        use Role::*;
        use Signal::*;
        match self {
            PatchType::Ambient => &[
                Step(SoundSource, Effect, Audio),
                Step(Modulator, SoundSource, Cv),
                Step(Effect, Amplifier, Audio),
                Step(Modulator, Effect, Cv),
            ],
            PatchType::Generative => &[
                Step(Clock, Sequencer, Gate),
                Step(Sequencer, SoundSource, Pitch),
                Step(SoundSource, Effect, Audio),
                Step(Modulator, SoundSource, Cv),
                Step(SoundSource, Processor, Audio),
            ],
            PatchType::Percussion => &[
                Step(Clock, Modulator, Gate),
                Step(Sequencer, SoundSource, Gate),
                Step(SoundSource, Processor, Audio),
                Step(Modulator, Amplifier, Cv),
                Step(Processor, Amplifier, Audio),
            ],
            PatchType::Bass => &[
                Step(SoundSource, Processor, Audio),
                Step(Modulator, Processor, Cv),
                Step(Processor, Amplifier, Audio),
                Step(Sequencer, SoundSource, Pitch),
            ],
            PatchType::Lead => &[
                Step(SoundSource, Processor, Audio),
                Step(Processor, Amplifier, Audio),
                Step(Modulator, Processor, Cv),
                Step(Amplifier, Effect, Audio),
            ],
            PatchType::Drone => &[
                Step(SoundSource, Processor, Audio),
                Step(Processor, Effect, Audio),
                Step(SoundSource, Effect, Audio),
                Step(Modulator, Processor, Cv),
                Step(Modulator, SoundSource, Cv),
            ],
            PatchType::Techno => &[
                Step(Clock, Sequencer, Gate),
                Step(Sequencer, SoundSource, Pitch),
                Step(SoundSource, Processor, Audio),
                Step(Modulator, Processor, Cv),
                Step(Processor, Effect, Audio),
            ],
        }
    }

    fn control_rules(&self) -> &'static [ControlRule] {
        match self {
            PatchType::Ambient => &[
                ControlRule(&["MIX", "BLEND", "WET", "REVERB"], 0.75, "3 o'clock", "Mostly wet for a spacious tail", 4),
                ControlRule(&["FREQ", "PITCH", "TUNE"], 0.3, "9 o'clock", "Sit in a low, relaxed register", 3),
                ControlRule(&["SIZE", "DENSITY", "TEXTURE"], 0.6, "1 o'clock", "Open up the texture", 3),
                ControlRule(&["RISE", "FALL", "DECAY", "RATE"], 0.8, "4 o'clock", "Slow movement", 3),
            ],
            PatchType::Generative => &[
                ControlRule(&["DENSITY", "PROBABILITY", "CHANCE"], 0.5, "12 o'clock", "Balance order and chance", 4),
                ControlRule(&["DIVISION", "BPM", "RATE"], 0.4, "11 o'clock", "Unhurried clock", 3),
                ControlRule(&["MIX", "BLEND", "WET"], 0.5, "12 o'clock", "Even blend", 2),
                ControlRule(&["FREQ", "PITCH", "TUNE"], 0.5, "12 o'clock", "Center the pitch range", 2),
            ],
            PatchType::Percussion => &[
                ControlRule(&["DECAY", "FALL", "RELEASE"], 0.15, "8 o'clock", "Short, snappy decay", 5),
                ControlRule(&["RISE", "ATTACK"], 0.0, "fully counter-clockwise", "Instant attack", 4),
                ControlRule(&["FREQ", "PITCH", "TUNE"], 0.4, "11 o'clock", "Tune the body of the hit", 3),
                ControlRule(&["RESONANCE", "STRUCTURE", "HARMONICS"], 0.6, "1 o'clock", "Add ring to the hit", 2),
            ],
            PatchType::Bass => &[
                ControlRule(&["FREQ", "PITCH", "TUNE"], 0.2, "8 o'clock", "Low register", 5),
                ControlRule(&["CUTOFF"], 0.35, "10 o'clock", "Dark, round tone", 4),
                ControlRule(&["RESONANCE", "STRUCTURE", "HARMONICS"], 0.55, "1 o'clock", "Some bite", 3),
                ControlRule(&["DECAY", "FALL"], 0.35, "10 o'clock", "Punchy envelope", 3),
            ],
            PatchType::Lead => &[
                ControlRule(&["FREQ", "PITCH", "TUNE"], 0.6, "1 o'clock", "Mid-high register", 4),
                ControlRule(&["TIMBRE", "MORPH", "HARMONICS"], 0.5, "12 o'clock", "Expressive starting point", 3),
                ControlRule(&["MIX", "BLEND", "WET"], 0.35, "10 o'clock", "Light ambience", 2),
                ControlRule(&["RISE", "ATTACK"], 0.1, "8 o'clock", "Quick attack", 3),
            ],
            PatchType::Drone => &[
                ControlRule(&["FREQ", "PITCH", "TUNE"], 0.25, "9 o'clock", "Low fundamental", 4),
                ControlRule(&["MIX", "BLEND", "WET", "FEEDBACK"], 0.8, "4 o'clock", "Long wash", 4),
                ControlRule(&["RISE", "FALL", "RATE"], 0.9, "5 o'clock", "Very slow movement", 3),
            ],
            PatchType::Techno => &[
                ControlRule(&["BPM", "TEMPO"], 0.5, "12 o'clock", "Around 125-130 BPM", 5),
                ControlRule(&["DECAY", "FALL"], 0.3, "9 o'clock", "Tight envelopes", 4),
                ControlRule(&["RESONANCE", "STRUCTURE"], 0.65, "2 o'clock", "Squelch", 3),
                ControlRule(&["MIX", "BLEND", "WET"], 0.3, "10 o'clock", "Dry and punchy", 2),
            ],
        }
    }
}

impl std::fmt::Display for PatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function a module plays in a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SoundSource,
    Processor,
    Modulator,
    Amplifier,
    Effect,
    Sequencer,
    Clock,
    Utility,
}

/// Module type keywords per role, checked in order
const ROLE_TABLE: &[(Role, &[&str])] = &[
    (Role::Effect, &["effect", "reverb", "delay", "granular", "echo"]),
    (Role::SoundSource, &["oscillator", "vco", "resonator", "voice", "drum", "noise"]),
    (Role::Processor, &["filter", "vcf", "waveshaper", "distortion"]),
    (Role::Modulator, &["envelope", "lfo", "function", "random", "modulat", "adsr"]),
    (Role::Amplifier, &["vca", "amplifier", "mixer"]),
    (Role::Sequencer, &["sequencer", "quantizer", "arpeggiator"]),
    (Role::Clock, &["clock", "divider", "trigger"]),
];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SoundSource => "sound source",
            Role::Processor => "processor",
            Role::Modulator => "modulator",
            Role::Amplifier => "amplifier",
            Role::Effect => "effect",
            Role::Sequencer => "sequencer",
            Role::Clock => "clock",
            Role::Utility => "utility",
        }
    }

    /// Role for a stored module type string
    pub fn for_module_type(module_type: Option<&str>) -> Self {
        let lowered = module_type.unwrap_or_default().to_lowercase();
        ROLE_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|(role, _)| *role)
            .unwrap_or(Role::Utility)
    }

    /// Control recommended when a module has none stored
    fn generic_control(&self) -> &'static str {
        match self {
            Role::SoundSource => "FREQUENCY",
            Role::Processor => "CUTOFF",
            Role::Modulator => "RATE",
            Role::Amplifier => "LEVEL",
            Role::Effect => "MIX",
            Role::Sequencer => "LENGTH",
            Role::Clock => "TEMPO",
            Role::Utility => "LEVEL",
        }
    }
}

/// Kind of signal carried by a cable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Audio,
    Cv,
    Gate,
    Pitch,
}

impl Signal {
    fn output_keywords(&self) -> &'static [&'static str] {
        match self {
            Signal::Audio => &["OUT"],
            Signal::Cv => &["CV", "UNITY", "SUM", "LFO", "ENV", "OUT"],
            Signal::Gate => &["CLK", "CLOCK", "GATE", "TRIG", "EOC", "OUT"],
            Signal::Pitch => &["PITCH", "CV", "OUT"],
        }
    }

    fn input_keywords(&self) -> &'static [&'static str] {
        match self {
            Signal::Audio => &["IN"],
            Signal::Cv => &["FM", "CV", "TIMBRE", "MOD", "POSITION", "DENSITY", "TEXTURE", "CUTOFF"],
            Signal::Gate => &["TRIG", "GATE", "CLK", "CLOCK", "STRUM", "RESET"],
            Signal::Pitch => &["V/OCT", "PITCH", "1V"],
        }
    }

    fn generic_output(&self) -> &'static str {
        match self {
            Signal::Audio => "OUT",
            Signal::Cv => "CV OUT",
            Signal::Gate => "GATE OUT",
            Signal::Pitch => "PITCH OUT",
        }
    }

    fn generic_input(&self) -> &'static str {
        match self {
            Signal::Audio => "IN",
            Signal::Cv => "CV IN",
            Signal::Gate => "TRIG",
            Signal::Pitch => "V/OCT",
        }
    }

    fn describe(&self, source: &str, target: &str) -> String {
        match self {
            Signal::Audio => format!("Route audio from {} to {} for processing", source, target),
            Signal::Cv => format!("Modulate {} with {}", target, source),
            Signal::Gate => format!("Trigger {} from {}", target, source),
            Signal::Pitch => format!("Drive the pitch of {} from {}", target, source),
        }
    }

    fn importance(&self) -> i64 {
        match self {
            Signal::Audio | Signal::Gate => 5,
            Signal::Pitch => 4,
            Signal::Cv => 3,
        }
    }
}

/// Template step: cable from the first module with one role to the first with another
#[derive(Debug, Clone, Copy)]
struct Step(Role, Role, Signal);

/// Control names matched, numeric value, clock-face text, description, importance
#[derive(Debug, Clone, Copy)]
struct ControlRule(&'static [&'static str], f64, &'static str, &'static str, i64);

/// Module with its stored jacks and controls
#[derive(Debug, Clone)]
pub struct CandidateModule {
    pub module: Module,
    pub connections: Vec<ModuleConnection>,
    pub controls: Vec<ModuleControl>,
}

/// Reference to a source the idea drew on
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source_type: String,
    pub title: String,
    pub url: Option<String>,
    pub relevance: f64,
}

/// Generated idea as returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct PatchIdeaView {
    #[serde(flatten)]
    pub detail: PatchIdeaDetail,
    pub sources: Vec<SourceRef>,
}

/// Classify a prompt into an archetype
///
/// An archetype named outright wins (declared order). Otherwise the archetype
/// with the most keyword hits wins, ties going to declared order. No hit at
/// all means ambient.
pub fn classify_prompt(prompt: &str) -> PatchType {
    let words = prompt_words(prompt);
    let mentions = |keyword: &str| words.iter().any(|word| word.starts_with(keyword));

    if let Some(named) = PatchType::ALL.iter().find(|t| mentions(t.as_str())) {
        return *named;
    }

    let mut best = (PatchType::Ambient, 0usize);
    for patch_type in PatchType::ALL {
        let hits = patch_type.keywords().iter().filter(|kw| mentions(**kw)).count();
        if hits > best.1 {
            best = (patch_type, hits);
        }
    }
    best.0
}

fn prompt_words(prompt: &str) -> Vec<String> {
    prompt
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Complexity in 1..=5, defaulting to 3
pub fn clamp_complexity(complexity: Option<i64>) -> i64 {
    complexity.unwrap_or(DEFAULT_COMPLEXITY).clamp(1, 5)
}

/// Candidates sorted by the archetype's role priorities, others after
fn order_by_relevance(candidates: &[CandidateModule], patch_type: PatchType) -> Vec<(Role, &CandidateModule)> {
    let mut ranked: Vec<(usize, Role, &CandidateModule)> = candidates
        .iter()
        .map(|candidate| {
            let role = Role::for_module_type(candidate.module.module_type.as_deref());
            let rank = patch_type
                .priorities()
                .iter()
                .position(|r| *r == role)
                .unwrap_or(usize::MAX);
            (rank, role, candidate)
        })
        .collect();
    ranked.sort_by_key(|(rank, _, _)| *rank);
    ranked.into_iter().map(|(_, role, c)| (role, c)).collect()
}

/// Token-prefix match of a jack/control name against an upper-case keyword
fn name_matches(name: &str, keyword: &str) -> bool {
    let upper = name.to_uppercase();
    upper == keyword
        || upper.split_whitespace().any(|token| token.starts_with(keyword))
        || (keyword.contains('/') && upper.contains(keyword))
}

/// Best stored jack of the given direction for the signal, else a generic name
fn pick_jack(candidate: &CandidateModule, direction: &str, keywords: &[&str], generic: &str) -> (Option<i64>, String) {
    let jacks: Vec<&ModuleConnection> = candidate
        .connections
        .iter()
        .filter(|c| c.connection_type.eq_ignore_ascii_case(direction))
        .collect();

    keywords
        .iter()
        .find_map(|kw| jacks.iter().find(|jack| name_matches(&jack.name, kw)))
        .map(|jack| (Some(jack.id), jack.name.clone()))
        .unwrap_or_else(|| (None, generic.to_string()))
}

/// Build the idea for the given modules without touching the store
pub fn plan_patch(candidates: &[CandidateModule], prompt: &str, complexity: i64) -> NewPatchIdea {
    let patch_type = classify_prompt(prompt);
    let ordered = order_by_relevance(candidates, patch_type);
    debug!(patch_type = %patch_type, modules = ordered.len(), "Planning patch");

    let max_cables = (complexity + 1).max(2) as usize;
    let mut cables: Vec<NewPatchConnection> = Vec::new();
    let mut used: Vec<i64> = Vec::new();

    let first_with = |role: Role, except: Option<i64>| {
        ordered
            .iter()
            .find(|(r, c)| *r == role && Some(c.module.id) != except)
            .map(|(_, c)| *c)
    };

    for Step(from, to, signal) in patch_type.template() {
        if cables.len() >= max_cables {
            break;
        }
        let Some(source) = first_with(*from, None) else { continue };
        let Some(target) = first_with(*to, Some(source.module.id)) else { continue };
        cables.push(cable(cables.len(), source, target, *signal));
        for id in [source.module.id, target.module.id] {
            if !used.contains(&id) {
                used.push(id);
            }
        }
    }

    // No template step fits: chain modules in relevance order
    if cables.is_empty() {
        for pair in ordered.windows(2).take(max_cables) {
            cables.push(cable(cables.len(), pair[0].1, pair[1].1, Signal::Audio));
            for id in [pair[0].1.module.id, pair[1].1.module.id] {
                if !used.contains(&id) {
                    used.push(id);
                }
            }
        }
    }
    if used.is_empty() {
        used.extend(ordered.iter().take(max_cables).map(|(_, c)| c.module.id));
    }

    let in_patch: Vec<(Role, &CandidateModule)> = ordered
        .iter()
        .filter(|(_, c)| used.contains(&c.module.id))
        .copied()
        .collect();

    let modules = in_patch
        .iter()
        .map(|(role, c)| NewPatchModule {
            module_id: c.module.id,
            role: role.as_str().to_string(),
            importance: if patch_type.key_roles().contains(role) { 5 } else { 3 },
        })
        .collect();

    let settings = in_patch
        .iter()
        .flat_map(|(role, c)| control_settings(patch_type, *role, c))
        .collect();

    let names: Vec<&str> = in_patch.iter().map(|(_, c)| c.module.name.as_str()).collect();
    let title = match names.as_slice() {
        [] => format!("{} Patch", patch_type.title()),
        [only] => format!("{} Patch with {}", patch_type.title(), only),
        [first, second, ..] => format!("{} Patch with {} and {}", patch_type.title(), first, second),
    };
    let description = format!(
        "A {} patch that uses {}. {}.",
        patch_type,
        names.iter().take(3).copied().collect::<Vec<_>>().join(", "),
        patch_type.description()
    );

    NewPatchIdea {
        title,
        description,
        patch_type: patch_type.as_str().to_string(),
        complexity,
        source_type: "generated".to_string(),
        source_url: None,
        source_text: Some(format!("Generated based on user prompt: {}", prompt)),
        modules,
        connections: cables,
        settings,
    }
}

fn cable(index: usize, source: &CandidateModule, target: &CandidateModule, signal: Signal) -> NewPatchConnection {
    let (source_connection_id, source_jack) =
        pick_jack(source, "output", signal.output_keywords(), signal.generic_output());
    let (target_connection_id, target_jack) =
        pick_jack(target, "input", signal.input_keywords(), signal.generic_input());

    NewPatchConnection {
        source_module_id: source.module.id,
        source_connection_id,
        source_jack,
        target_module_id: target.module.id,
        target_connection_id,
        target_jack,
        cable_color: CABLE_COLORS[index % CABLE_COLORS.len()].to_string(),
        description: signal.describe(&source.module.name, &target.module.name),
        importance: signal.importance(),
    }
}

/// Up to two knob recommendations for one module
fn control_settings(patch_type: PatchType, role: Role, candidate: &CandidateModule) -> Vec<NewControlSetting> {
    let rules = patch_type.control_rules();
    let rule_for = |name: &str| {
        rules
            .iter()
            .find(|ControlRule(keywords, ..)| keywords.iter().any(|kw| name_matches(name, kw)))
    };
    let module_id = candidate.module.id;

    if candidate.controls.is_empty() {
        let name = role.generic_control();
        let setting = match rule_for(name) {
            Some(ControlRule(_, value, text, description, importance)) => NewControlSetting {
                module_id,
                control_id: None,
                control_name: name.to_string(),
                value_numeric: Some(*value),
                value_text: text.to_string(),
                description: description.to_string(),
                importance: *importance,
            },
            None => NewControlSetting {
                module_id,
                control_id: None,
                control_name: name.to_string(),
                value_numeric: Some(0.5),
                value_text: "12 o'clock".to_string(),
                description: format!("Start from the middle and adjust to taste ({})", role.as_str()),
                importance: 2,
            },
        };
        return vec![setting];
    }

    let mut seen_rules = HashSet::new();
    candidate
        .controls
        .iter()
        .filter_map(|control| {
            let index = rules
                .iter()
                .position(|ControlRule(keywords, ..)| keywords.iter().any(|kw| name_matches(&control.control_name, kw)))?;
            // One control per rule
            if !seen_rules.insert(index) {
                return None;
            }
            let ControlRule(_, value, text, description, importance) = rules[index];
            Some(NewControlSetting {
                module_id,
                control_id: Some(control.id),
                control_name: control.control_name.clone(),
                value_numeric: Some(value),
                value_text: text.to_string(),
                description: description.to_string(),
                importance,
            })
        })
        .take(2)
        .collect()
}

/// Generate, store and return a patch idea
pub async fn generate_patch(
    pool: &SqlitePool,
    selection: &ModuleSelection,
    prompt: &str,
    complexity: Option<i64>,
) -> Result<PatchIdeaView, Error> {
    let complexity = clamp_complexity(complexity);
    let mut conn = pool.acquire().await?;

    let candidates = load_candidates(&mut conn, selection).await?;
    if candidates.is_empty() {
        return Err(Error::InvalidInput("No valid modules provided".to_string()));
    }

    let plan = plan_patch(&candidates, prompt, complexity);
    drop(conn);

    let mut tx = pool.begin().await?;
    let patch_id = patches::insert_patch_idea(&mut tx, &plan).await?;
    tx.commit().await?;

    info!(
        patch_id,
        patch_type = %plan.patch_type,
        cables = plan.connections.len(),
        "Patch idea generated"
    );

    let mut conn = pool.acquire().await?;
    let detail = patches::get_patch_idea(&mut conn, patch_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Patch idea {} vanished after insert", patch_id)))?;

    let mut sources = vec![SourceRef {
        source_type: "generated".to_string(),
        title: detail.idea.title.clone(),
        url: None,
        relevance: 1.0,
    }];
    for module in &plan.modules {
        let stored = forum::forum_sources_for_module(&mut conn, module.module_id, None).await?;
        sources.extend(stored.into_iter().take(2).map(|s| SourceRef {
            source_type: s.source_type,
            title: s.title.unwrap_or_default(),
            url: Some(s.url),
            relevance: s.relevance_score.unwrap_or(0.0),
        }));
    }

    Ok(PatchIdeaView { detail, sources })
}

async fn load_candidates(
    conn: &mut SqliteConnection,
    selection: &ModuleSelection,
) -> Result<Vec<CandidateModule>, Error> {
    let selected: Vec<Module> = match selection {
        ModuleSelection::Rack(rack_id) => {
            racks::get_rack(conn, *rack_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Rack {} not found", rack_id)))?;
            let mut seen = HashSet::new();
            racks::rack_modules(conn, *rack_id)
                .await?
                .into_iter()
                .map(|racked| racked.module)
                .filter(|module| seen.insert(module.id))
                .collect()
        }
        ModuleSelection::Modules(ids) => {
            let mut seen = HashSet::new();
            let unique: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
            modules::get_modules(conn, &unique).await?
        }
    };

    let mut candidates = Vec::with_capacity(selected.len());
    for module in selected {
        let connections = modules::connections_for_module(conn, module.id).await?;
        let controls = modules::controls_for_module(conn, module.id).await?;
        candidates.push(CandidateModule {
            module,
            connections,
            controls,
        });
    }
    Ok(candidates)
}
