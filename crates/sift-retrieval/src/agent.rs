//! The iterative retrieval agent: search, consult the model, decide
//! whether to refine the query and search again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use sift_config::RetrievalMode;
use sift_models::{recover, LanguageModel};

use crate::retriever::{Retriever, SearchOutcome};
use crate::RetrievalError;

const NO_ACCESS_ANSWER: &str =
    "You do not have access to any indexed documents, so the question cannot be answered.";

/// How much accumulated context a degraded answer quotes.
const DEGRADED_CONTEXT_CHARS: usize = 500;

/// One prior conversation turn, folded into the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// The model's structured decision each iteration.
#[derive(Debug, Clone, Default, Deserialize)]
struct Decision {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    need_more: bool,
    #[serde(default)]
    next_query: String,
}

pub struct RagAgent {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<Retriever>,
    mode: RetrievalMode,
}

impl RagAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, retriever: Arc<Retriever>, mode: RetrievalMode) -> Self {
        RagAgent {
            llm,
            retriever,
            mode,
        }
    }

    /// Resolve a user question to an answer.
    pub async fn process(
        &self,
        user_id: &str,
        user_input: &str,
        history: &[ChatTurn],
    ) -> Result<String, RetrievalError> {
        let max_iterations = self.mode.max_iterations();
        let mut context = String::new();
        let mut query = user_input.to_string();
        let mut last_results: Vec<String> = Vec::new();

        for iteration in 1..=max_iterations {
            debug!("retrieval pass {iteration}/{max_iterations}: {query}");

            match self.retriever.search_chunks(user_id, &query).await? {
                SearchOutcome::NoAccess => return Ok(NO_ACCESS_ANSWER.to_string()),
                SearchOutcome::Hits(results) => {
                    if !results.is_empty() {
                        context.push_str(&format!(
                            "\n\n=== Search results {iteration} ===\n{}",
                            results.join("\n")
                        ));
                    }
                    last_results = results;
                }
            }

            // Even a zero-hit pass consults the model, so it can state
            // insufficiency instead of silently looping.
            let is_final = iteration == max_iterations;
            let prompt = self.build_prompt(user_input, &context, iteration, is_final, history);
            let decision = match self.decide(&prompt).await {
                Some(decision) => decision,
                None if is_final => {
                    let prefix: String = context.chars().take(DEGRADED_CONTEXT_CHARS).collect();
                    return Ok(format!(
                        "A grounded answer could not be produced. Retrieved \
                         context follows:\n{prefix}"
                    ));
                }
                None => continue,
            };

            // Normal mode returns after its single pass, whatever the
            // model's flag says.
            if self.mode == RetrievalMode::Normal || is_final || !decision.need_more {
                self.log_referenced_chunks(&last_results);
                return Ok(decision.answer);
            }

            let next = decision.next_query.trim();
            query = if next.is_empty() {
                user_input.to_string()
            } else {
                next.to_string()
            };
        }

        Ok("The retrieval loop ended without an answer.".to_string())
    }

    /// One structured call, leniently parsed, with a single repair
    /// reprompt before giving up.
    async fn decide(&self, prompt: &str) -> Option<Decision> {
        let schema = output_schema();
        let raw = match self.llm.complete_structured(prompt, &schema).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("model call failed: {e}");
                return None;
            }
        };
        if let Some(value) = recover::recover_json(&raw) {
            return serde_json::from_value(value).ok();
        }

        let repair = recover::repair_prompt(&schema.to_string(), &raw);
        match self.llm.complete(&repair).await {
            Ok(repaired) => recover::recover_json(&repaired)
                .and_then(|value| serde_json::from_value(value).ok()),
            Err(e) => {
                warn!("repair reprompt failed: {e}");
                None
            }
        }
    }

    fn build_prompt(
        &self,
        user_input: &str,
        context: &str,
        iteration: usize,
        is_final: bool,
        history: &[ChatTurn],
    ) -> String {
        let history_window = match self.mode {
            RetrievalMode::Normal => 3,
            RetrievalMode::Deep => 5,
            RetrievalMode::Deeper => 7,
        };
        let history_text = history
            .iter()
            .rev()
            .take(history_window)
            .rev()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");
        let context_text = if context.is_empty() {
            "No information has been retrieved."
        } else {
            context
        };

        let max_iterations = self.mode.max_iterations();
        let grounding = "Answer only from the retrieved information above. If it is \
                         insufficient, say so explicitly instead of guessing or filling \
                         gaps with general knowledge.";

        let instructions = match self.mode {
            RetrievalMode::Normal => "This mode performs exactly one search. Set `need_more` \
                 to false and leave `next_query` empty; write a concise answer in `answer`."
                .to_string(),
            RetrievalMode::Deep | RetrievalMode::Deeper if is_final => {
                "This is the final pass; no further searches will run. Set `need_more` to \
                 false and leave `next_query` empty. If the information suffices, answer \
                 completely in `answer`; otherwise state what is missing."
                    .to_string()
            }
            RetrievalMode::Deep => format!(
                "Pass {iteration} of {max_iterations}. If the information suffices, set \
                 `need_more` to false and answer in `answer`. If not, set `need_more` to \
                 true, explain what is missing in `answer`, and put a sharper search \
                 query in `next_query`."
            ),
            RetrievalMode::Deeper => {
                let strategy = iteration_strategy(iteration);
                format!(
                    "Pass {iteration} of {max_iterations}. Goal for this pass: {strategy} \
                     If the information suffices or further searching is pointless, set \
                     `need_more` to false and answer in `answer`. Otherwise set \
                     `need_more` to true and put a query matching this pass's goal in \
                     `next_query`."
                )
            }
        };

        format!(
            "You are a research assistant answering questions from a private \
             document index.\n\n\
             [Conversation history]\n{history_text}\n\n\
             [User question]\n{user_input}\n\n\
             [Retrieved information]\n{context_text}\n\n\
             {grounding}\n\n{instructions}"
        )
    }

    fn log_referenced_chunks(&self, results: &[String]) {
        for (i, chunk) in results.iter().enumerate() {
            let preview: String = chunk.chars().take(200).collect();
            debug!("referenced chunk {}: {preview}", i + 1);
        }
    }
}

/// Per-pass strategy labels for deeper mode.
fn iteration_strategy(iteration: usize) -> &'static str {
    match iteration {
        1 => "collect basic facts about the question's core concepts.",
        2 => "dig into details: concrete cases, figures, and specifics.",
        3 => "broaden the context: background, history, adjacent topics.",
        4 => "gather other perspectives: opposing views and critiques.",
        5 => "verify and synthesize: cross-check what was collected and fill gaps.",
        _ => "gather comprehensive information.",
    }
}

fn output_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "answer": {
                "type": "string",
                "description": "The response or reasoning so far"
            },
            "need_more": {
                "type": "boolean",
                "description": "Whether another search pass is needed"
            },
            "next_query": {
                "type": "string",
                "description": "Query for the next pass; empty when need_more is false"
            }
        },
        "required": ["answer", "need_more"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::tests::test_retriever;
    use sift_index::MemoryStore;
    use sift_models::StubLanguageModel;
    use sift_wire::Shutdown;
    use std::collections::HashMap;

    async fn empty_index_retriever(shutdown: &Shutdown, user: &str) -> Arc<Retriever> {
        Arc::new(
            test_retriever(
                shutdown,
                HashMap::from([(user.to_string(), vec!["docs/a.txt".to_string()])]),
                HashMap::new(),
                Arc::new(MemoryStore::new()),
            )
            .await,
        )
    }

    #[tokio::test]
    async fn test_normal_mode_returns_first_answer() {
        let shutdown = Shutdown::new();
        let retriever = empty_index_retriever(&shutdown, "u").await;
        // need_more=true must be ignored in normal mode.
        let llm = Arc::new(StubLanguageModel::scripted([
            r#"{"answer": "done", "need_more": true, "next_query": "more"}"#,
        ]));
        let agent = RagAgent::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            retriever,
            RetrievalMode::Normal,
        );

        let answer = agent.process("u", "question?", &[]).await.unwrap();
        assert_eq!(answer, "done");
        assert_eq!(llm.calls().len(), 1);
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_deep_mode_refines_query() {
        let shutdown = Shutdown::new();
        let retriever = empty_index_retriever(&shutdown, "u").await;
        let llm = Arc::new(StubLanguageModel::scripted([
            r#"{"answer": "need specifics", "need_more": true, "next_query": "budget details"}"#,
            r#"{"answer": "final answer", "need_more": false, "next_query": ""}"#,
        ]));
        let agent = RagAgent::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            retriever,
            RetrievalMode::Deep,
        );

        let answer = agent.process("u", "what about the budget?", &[]).await.unwrap();
        assert_eq!(answer, "final answer");
        // One decision per pass: the first asked to continue.
        assert_eq!(llm.calls().len(), 2);
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_empty_next_query_falls_back_to_user_input() {
        let shutdown = Shutdown::new();
        let retriever = empty_index_retriever(&shutdown, "u").await;
        let llm = Arc::new(StubLanguageModel::scripted([
            r#"{"answer": "looking", "need_more": true, "next_query": "  "}"#,
            r#"{"answer": "ok", "need_more": false}"#,
        ]));
        let agent = RagAgent::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            retriever,
            RetrievalMode::Deep,
        );

        agent.process("u", "the original question", &[]).await.unwrap();
        let calls = llm.calls();
        // Second prompt still centers on the user's question.
        assert!(calls[1].contains("the original question"));
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_no_access_short_circuits() {
        let shutdown = Shutdown::new();
        let retriever = Arc::new(
            test_retriever(
                &shutdown,
                HashMap::new(),
                HashMap::new(),
                Arc::new(MemoryStore::new()),
            )
            .await,
        );
        let llm = Arc::new(StubLanguageModel::new());
        let agent = RagAgent::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            retriever,
            RetrievalMode::Deep,
        );

        let answer = agent.process("stranger", "anything", &[]).await.unwrap();
        assert_eq!(answer, NO_ACCESS_ANSWER);
        assert!(llm.calls().is_empty());
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_unrecoverable_final_output_degrades_with_context() {
        let shutdown = Shutdown::new();
        let retriever = empty_index_retriever(&shutdown, "u").await;
        // Normal mode: one pass; both the structured call and the repair
        // reprompt produce garbage.
        let llm = Arc::new(StubLanguageModel::scripted(["garbage", "more garbage"]));
        let agent = RagAgent::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            retriever,
            RetrievalMode::Normal,
        );

        let answer = agent.process("u", "question?", &[]).await.unwrap();
        assert!(answer.contains("could not be produced"));
        assert_eq!(llm.calls().len(), 2);
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_deeper_mode_injects_strategy() {
        let shutdown = Shutdown::new();
        let retriever = empty_index_retriever(&shutdown, "u").await;
        let llm = Arc::new(StubLanguageModel::scripted([
            r#"{"answer": "a", "need_more": true, "next_query": "q2"}"#,
            r#"{"answer": "b", "need_more": false}"#,
        ]));
        let agent = RagAgent::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            retriever,
            RetrievalMode::Deeper,
        );

        agent.process("u", "question?", &[]).await.unwrap();
        let calls = llm.calls();
        assert!(calls[0].contains("basic facts"));
        assert!(calls[1].contains("details"));
        shutdown.cancel_all();
    }

    #[tokio::test]
    async fn test_history_is_folded_into_prompt() {
        let shutdown = Shutdown::new();
        let retriever = empty_index_retriever(&shutdown, "u").await;
        let llm = Arc::new(StubLanguageModel::scripted([
            r#"{"answer": "ok", "need_more": false}"#,
        ]));
        let agent = RagAgent::new(
            Arc::clone(&llm) as Arc<dyn LanguageModel>,
            retriever,
            RetrievalMode::Normal,
        );

        let history = vec![ChatTurn {
            role: "user".to_string(),
            content: "earlier remark".to_string(),
        }];
        agent.process("u", "question?", &history).await.unwrap();
        assert!(llm.calls()[0].contains("earlier remark"));
        shutdown.cancel_all();
    }
}
