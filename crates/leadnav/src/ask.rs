use anyhow::Result;

use leadnav_core::{apply_filter, compute_metrics, MetricsInput};
use leadnav_llm::LlmClient;
use leadnav_rag::{answer_question, build_snippets, HashEmbedder, RagQuery, SnippetIndex};

use crate::config::LeadNavConfig;
use crate::load;
use crate::logging;

pub fn run(
    input: String,
    question: String,
    kind: String,
    mapping: Option<String>,
    filter: Option<String>,
    top_k: Option<usize>,
) -> Result<()> {
    let config = LeadNavConfig::from_env()?;
    let top_k = config.top_k_or(top_k);
    let loaded = load::load_dataset(&input, &kind, mapping.as_deref())?;
    let spec = load::read_filter(filter.as_deref())?;
    let view = apply_filter(&loaded.dataset, &spec);
    let metrics = compute_metrics(&view, &MetricsInput::default());

    let snippets = build_snippets(&loaded.dataset, &metrics);
    logging::stage("ask", format!("indexed {} snippets", snippets.len()));
    let index = SnippetIndex::build(snippets, HashEmbedder::default());

    let client = LlmClient::new(config.provider, config.model)?;
    let query = RagQuery { question, top_k };
    let answer = answer_question(&index, &client, &query);

    if answer.fallback {
        logging::info("answered from snippets without the model");
    }
    println!("{}", answer.answer);
    if !answer.used_snippets.is_empty() {
        println!("\nBased on: {}", answer.used_snippets.join(", "));
    }
    Ok(())
}
