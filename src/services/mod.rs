pub mod bot;
pub mod llm;
pub mod metadata;
pub mod prompts;
pub mod providers;
pub mod recommendations;
pub mod session;
pub mod title_resolver;

pub use bot::{Bot, EventOutcome};
pub use llm::{LlmClient, OpenAiClient, PromptMessage};
pub use metadata::MetadataFetcher;
pub use recommendations::{Recommendation, RecommendationMode, RecommendationOrchestrator, Strategy};
pub use session::SessionState;
pub use title_resolver::TitleResolver;
