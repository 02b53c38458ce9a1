pub mod invocation;
pub mod resolver;

pub use invocation::{InvocationExecutor, RetryPolicy};
pub use resolver::AnswerResolver;
