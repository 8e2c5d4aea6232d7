//! Prompt templates
//!
//! Templates are `.pmt` files rendered with Handlebars. Lookup order:
//! 1. `.pmagent/prompts/{name}.pmt` (user override)
//! 2. Embedded default compiled into the binary

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
