//! Query planning - turns the raw user query into a `QueryPlan`.
//!
//! The model is asked for a fenced YAML block; everything before the fence
//! (the model's reasoning) is discarded.

use crate::llm::{ChatModel, LlmError};
use async_trait::async_trait;
use std::sync::Arc;
use wellspring_common::QueryPlan;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("no yaml plan block in model response")]
    MissingPlanBlock,

    #[error("invalid plan yaml: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
}

#[async_trait]
pub trait QueryPlanner: Send + Sync {
    async fn plan(&self, query: &str) -> Result<QueryPlan, PlanError>;
}

const PLANNER_PROMPT: &str = r#"You turn a user question into web search queries. Follow these steps carefully:

0. Current time is {{CURRENT_TIME}}.

1. The user question:
<user_query>
{{USER_QUERY}}
</user_query>

2. Detect the language of the question as a two-letter code ("en", "ko", "de", ...).

3. Think step by step about which searches would surface the information needed, and write that reasoning inside a <reasoning> block. If the question is just a noun or product name, assume the user wants a definition, explanation or review and search accordingly.

4. Produce one search query per distinct piece of information. For each query, add a description of what should be extracted from its results.

5. Write search queries in English. If the question is in another language and concerns local information (places, events, opening hours), add queries in that language as well.

6. After the reasoning block, output exactly one fenced YAML block:

```yaml
language: (language code)
search_queries:
- query: "(first search query)"
  description: "(what to extract)"
- query: "(second search query)"
  description: "(what to extract)"
instruction: |-
  (What the user wants; guidance for composing the final answer from the search results)
```

Start your response with <reasoning>"#;

/// Extract and parse the fenced YAML plan from a model response.
pub fn parse_plan(text: &str) -> Result<QueryPlan, PlanError> {
    let text = text.trim();
    let yaml = text
        .split_once("```yaml\n")
        .map(|(_, rest)| rest)
        .ok_or(PlanError::MissingPlanBlock)?;
    let yaml = yaml.trim_end().trim_end_matches("```").trim();

    Ok(serde_yaml::from_str(yaml)?)
}

pub struct LlmQueryPlanner {
    model: Arc<dyn ChatModel>,
}

impl LlmQueryPlanner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryPlanner for LlmQueryPlanner {
    async fn plan(&self, query: &str) -> Result<QueryPlan, PlanError> {
        let prompt = PLANNER_PROMPT
            .replace("{{CURRENT_TIME}}", &chrono::Utc::now().to_rfc2822())
            .replace("{{USER_QUERY}}", query);

        let response = self.model.complete(None, &prompt).await?;
        parse_plan(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_yaml_plan() {
        let response = "<reasoning>\nthe user wants a definition\n</reasoning>\n\n```yaml\nlanguage: en\nsearch_queries:\n- query: \"what is a borrow checker\"\n  description: \"definition and purpose\"\ninstruction: |-\n  Explain the borrow checker.\n```";
        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.language, "en");
        assert_eq!(plan.search_queries.len(), 1);
        assert_eq!(plan.search_queries[0].query, "what is a borrow checker");
        assert_eq!(plan.instruction.trim(), "Explain the borrow checker.");
    }

    #[test]
    fn rejects_response_without_fence() {
        let err = parse_plan("no yaml here").unwrap_err();
        assert!(matches!(err, PlanError::MissingPlanBlock));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = parse_plan("```yaml\n[not: a plan\n```").unwrap_err();
        assert!(matches!(err, PlanError::InvalidYaml(_)));
    }
}
