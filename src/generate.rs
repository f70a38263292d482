//! Grounded answer generation.
//!
//! The model gets a fixed policy prompt plus the retrieved chunks rendered
//! as `SOURCE (<filename>): <content>` blocks. With no chunks the context is
//! a sentinel line, and the policy tells the model to decline with
//! [`DECLINE_MESSAGE`] when the question needs company data.

use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::llm::ChatModel;
use crate::models::Chunk;

/// Context text used when retrieval found nothing.
pub const NO_CONTEXT: &str = "No specific documents found.";

/// The exact reply expected when company data is needed but absent.
pub const DECLINE_MESSAGE: &str =
    "I'm sorry, I couldn't find that specific information in the company documents available to me.";

pub const SYSTEM_PROMPT: &str = "You are a helpful, friendly, and professional AI assistant for a company.

Guidelines:
1. If the user's input is a greeting, small talk, or a general question (like 'How are you?' or 'What is the capital of France?'), answer naturally and amicably without referencing documents.
2. If the user asks a specific question about the company, projects, or internal data, use the provided Context to answer.
3. If the question requires internal data but the information is NOT in the Context, politely say: \"I'm sorry, I couldn't find that specific information in the company documents available to me.\"
4. Always maintain a polite and helpful tone.";

/// Render chunks into the grounding block.
pub fn build_grounding(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .map(|c| format!("SOURCE ({}): {}", c.metadata.filename, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_message(question: &str, chunks: &[Chunk]) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}",
        build_grounding(chunks),
        question
    )
}

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// One model call; the reply is returned verbatim.
    pub async fn generate(&self, question: &str, chunks: &[Chunk]) -> PipelineResult<String> {
        let user = build_user_message(question, chunks);
        self.model
            .complete(SYSTEM_PROMPT, &user)
            .await
            .map_err(|e| {
                tracing::error!(model = self.model.model_name(), error = %e, "generation failed");
                PipelineError::Generation(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(filename: &str, content: &str) -> Chunk {
        Chunk {
            content: content.into(),
            metadata: ChunkMetadata {
                filepath: format!("downloads/HR/{}", filename),
                filename: filename.into(),
                category: "HR".into(),
                page_no: 1,
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_grounding_format() {
        let text = build_grounding(&[
            chunk("leave.pdf", "Employees get 25 days."),
            chunk("sick.pdf", "Sick leave is unlimited."),
        ]);
        assert_eq!(
            text,
            "SOURCE (leave.pdf): Employees get 25 days.\n\nSOURCE (sick.pdf): Sick leave is unlimited."
        );
    }

    #[test]
    fn test_empty_context_uses_sentinel() {
        let msg = build_user_message("What is the bonus?", &[]);
        assert_eq!(
            msg,
            "Context:\nNo specific documents found.\n\nQuestion: What is the bonus?"
        );
    }

    #[test]
    fn test_prompt_carries_decline_phrase() {
        assert!(SYSTEM_PROMPT.contains(DECLINE_MESSAGE));
    }
}
