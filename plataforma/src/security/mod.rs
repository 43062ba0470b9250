mod hardener;
mod sanitizer;

pub use hardener::{HardenedPrompts, PromptHardener};
pub use sanitizer::{QuerySanitizer, SanitizationResult};
