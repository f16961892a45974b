//! Context Module
//!
//! Turns retrieved hits into the prompt handed to the generator.

pub mod prompt;

pub use prompt::{
    AssembledContext, FallbackPolicy, Prompt, PromptAssembler, MAX_CONTEXT_CHARS, MIN_SCORE,
    REFUSAL,
};
