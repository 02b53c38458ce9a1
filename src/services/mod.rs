pub mod audit;
pub mod image;
pub mod normalizer;
pub mod prompt;
pub mod registry;
pub mod routing;

pub use audit::{AuditRecord, AuditSink, JsonlAuditSink};
pub use image::{HttpImageFetcher, ImageFetcher, InlineImage};
pub use normalizer::AnswerNormalizer;
pub use prompt::PromptComposer;
pub use registry::{ProviderRegistry, RoutingSlot, SharedRegistry, TypeRouting};
pub use routing::{ReasoningReason, RoutingDecision, RoutingPolicy};
