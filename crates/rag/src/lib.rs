pub mod index;
pub mod orchestrator;
pub mod snippet;

pub use index::{HashEmbedder, HashEmbedderConfig, ScoredSnippet, SnippetIndex};
pub use orchestrator::{answer_question, AnswerBackend, RagAnswer, RagQuery};
pub use snippet::{build_snippets, Snippet};
pub use leadnav_llm::{LlmClient, LlmProvider, LlmRequest, LlmResponse};
