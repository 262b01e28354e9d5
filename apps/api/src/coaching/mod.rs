//! Conversational coaching: guides a candidate through INTRODUCTION,
//! STORY_DISCOVERY, ACHIEVEMENT_MINING and SYNTHESIS, turning free-text
//! answers into quantified resume bullets.

pub mod engine;
pub mod export;
pub mod extractor;
pub mod handlers;
pub mod phase;
pub mod prompts;
pub mod quality;
pub mod roles;
pub mod settings;
pub mod store;
pub mod strategist;
pub mod synthesizer;
pub mod text;
