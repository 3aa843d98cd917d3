//! Literal defaults substituted when extraction fails

/// Rack title when no title selector matches
pub const DEFAULT_RACK_TITLE: &str = "Unnamed Rack";

/// Rack name used for a placeholder rack
pub const FALLBACK_RACK_NAME: &str = "Fallback Rack";

pub const UNKNOWN_MODULE: &str = "Unknown Module";
pub const UNKNOWN_MANUFACTURER: &str = "Unknown Manufacturer";
pub const UNKNOWN_TYPE: &str = "Unknown";
pub const DEFAULT_HP_WIDTH: i64 = 10;
pub const DEFAULT_DESCRIPTION: &str = "Module information could not be retrieved";

/// Placeholder module substituted for an unreadable rack
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderModule {
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub module_type: &'static str,
    pub hp_width: i64,
    pub description: &'static str,
}

/// Fixed placeholder list; names match the starter catalog
pub const FALLBACK_MODULES: [PlaceholderModule; 3] = [
    PlaceholderModule {
        name: "Plaits",
        manufacturer: "Mutable Instruments",
        module_type: "Oscillator",
        hp_width: 12,
        description: "Macro-oscillator with multiple synthesis models",
    },
    PlaceholderModule {
        name: "Rings",
        manufacturer: "Mutable Instruments",
        module_type: "Resonator",
        hp_width: 14,
        description: "Modal resonator",
    },
    PlaceholderModule {
        name: "Clouds",
        manufacturer: "Mutable Instruments",
        module_type: "Granular Processor",
        hp_width: 18,
        description: "Texture synthesizer",
    },
];
