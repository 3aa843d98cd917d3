//! Application services: rack import, patch generation, knowledge cache and
//! catalog seeding

pub mod catalog;
pub mod knowledge;
pub mod patch_generator;
pub mod rack_parser;

pub use knowledge::{ForumKind, KnowledgeCache};
pub use patch_generator::{generate_patch, ModuleSelection, PatchIdeaView};
pub use rack_parser::{ParseError, RackParser, RackResult};
