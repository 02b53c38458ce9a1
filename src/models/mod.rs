pub mod answer;
pub mod provider;
pub mod question;
pub mod request;

pub use answer::{AnswerOutcome, FailureReport, InvocationResult, TokenUsage};
pub use provider::{ProviderConfig, TokenPricing};
pub use question::{Question, QuestionType, DEFAULT_JUDGEMENT_OPTIONS};
pub use request::{AnswerRequest, OptionsInput};
