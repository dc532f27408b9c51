//! Streaming answer generation over the crawled sources.
//!
//! Documents are numbered 1..n; the system prompt tells the model to cite
//! them inline as `text§[n]`, which the client resolves through the
//! `source_map_ready` event.

use crate::llm::{ChatModel, LlmError};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One crawled source, numbered for citation.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub number: usize,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub query: String,
    /// Planner instruction describing the user's intent.
    pub instruction: String,
    pub documents: Vec<SourceDocument>,
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Start generating; the receiver yields text chunks as produced, then
    /// closes on success or yields one error and closes.
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError>;
}

const GENERATOR_SYSTEM_PROMPT: &str = r#"You are Wellspring, a search engine that answers with up-to-date information from reference documents.

Guidelines for answering:

* Prioritize accuracy and completeness; answer comprehensively unless the user asks for brevity.
* Respond in the same language as the user's query unless instructed otherwise.
* Ground every claim in the provided reference documents; prefer them over your internal knowledge.
* When generating code, explain it and follow good practices.
* For reasoning tasks, walk through each step before the final answer.
* Cite the document you used inline, in the format: "text§[<document number>]"

Your responses must be Markdown, starting with a heading, organized for easy reading. Use tables, bold, italics and links where they help.

You have no knowledge cut-off date."#;

fn build_prompt(request: &GenerateRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str("<user_query>\n<query>\n");
    prompt.push_str(&request.query);
    prompt.push_str("\n</query>\n<instructions>\n");
    prompt.push_str(&request.instruction);
    prompt.push_str("\n</instructions>\n</user_query>\n\n<documents>\n");
    for doc in &request.documents {
        let _ = writeln!(
            prompt,
            "<document>\n<index>{}</index>\n<source>\n{}\n</source>\n<content>\n{}\n</content>\n</document>",
            doc.number, doc.url, doc.content
        );
    }
    prompt.push_str("</documents>\n");
    prompt
}

pub struct LlmAnswerGenerator {
    model: Arc<dyn ChatModel>,
}

impl LlmAnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<mpsc::Receiver<Result<String, LlmError>>, LlmError> {
        let prompt = build_prompt(&request);
        self.model.stream(Some(GENERATOR_SYSTEM_PROMPT), &prompt).await
    }
}
