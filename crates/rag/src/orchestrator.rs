use anyhow::Result;

use leadnav_llm::{LlmClient, LlmRequest};

use crate::index::{ScoredSnippet, SnippetIndex};

/// Hard bound on the characters of snippet context sent to the model.
const MAX_CONTEXT_LENGTH: usize = 2000;

const DEFAULT_TOP_K: usize = 5;

const SYSTEM_PROMPT: &str = "You are a marketing data analyst. Answer the question using only the \
dataset context between the markers. Quote concrete numbers from the context and say so plainly \
when the context does not contain the answer.";

/// Seam between retrieval and the model. Production uses an LlmClient;
/// tests swap in a canned or failing backend.
pub trait AnswerBackend {
    fn answer(&self, system: &str, prompt: &str) -> Result<String>;
}

impl AnswerBackend for LlmClient {
    fn answer(&self, system: &str, prompt: &str) -> Result<String> {
        let response = self.chat_blocking(&LlmRequest {
            system: Some(system.to_string()),
            user: prompt.to_string(),
        })?;
        Ok(response.content)
    }
}

#[derive(Debug, Clone)]
pub struct RagQuery {
    pub question: String,
    pub top_k: usize,
}

impl RagQuery {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    /// Ids of the snippets that made it into the context, in rank order.
    pub used_snippets: Vec<String>,
    /// True when the model was unreachable and the answer is a plain
    /// restatement of the best-matching snippet.
    pub fallback: bool,
}

/// Retrieve context for a question and ask the backend. A backend failure
/// (after its own retries) degrades to a deterministic snippet answer
/// rather than an error: the user still gets the numbers that matched.
pub fn answer_question(
    index: &SnippetIndex,
    backend: &dyn AnswerBackend,
    query: &RagQuery,
) -> RagAnswer {
    let hits = index.search(&query.question, query.top_k);
    let (context, used_snippets) = bounded_context(&hits);
    if used_snippets.is_empty() {
        return RagAnswer {
            answer: "No dataset is loaded, so there is nothing to answer from.".to_string(),
            used_snippets,
            fallback: true,
        };
    }
    let prompt = format!(
        "=== DATA CONTEXT ===\n{context}=== END CONTEXT ===\n\nQuestion: {}\nAnswer:",
        query.question.trim(),
    );
    match backend.answer(SYSTEM_PROMPT, &prompt) {
        Ok(answer) => RagAnswer {
            answer,
            used_snippets,
            fallback: false,
        },
        Err(err) => {
            tracing::warn!(error = %err, "model unavailable, answering from snippets");
            let best = hits
                .first()
                .map(|h| h.snippet.text.clone())
                .unwrap_or_default();
            RagAnswer {
                answer: format!("The model is unavailable. Closest matching data: {best}"),
                used_snippets,
                fallback: true,
            }
        }
    }
}

/// Concatenate ranked snippets until the length bound would be crossed.
/// The first snippet is always admitted, even oversized, so the context is
/// never empty when a hit exists.
fn bounded_context(hits: &[ScoredSnippet]) -> (String, Vec<String>) {
    let mut context = String::new();
    let mut used = Vec::new();
    for hit in hits {
        let line = format!("[{}] {}\n", hit.snippet.id, hit.snippet.text);
        if !used.is_empty() && context.len() + line.len() > MAX_CONTEXT_LENGTH {
            break;
        }
        context.push_str(&line);
        used.push(hit.snippet.id.clone());
    }
    (context, used)
}
