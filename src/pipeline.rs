//! Two-stage chat pipeline: retrieve, then generate.
//!
//! Each request gets a fresh [`RunState`]. The department gate runs before
//! anything else, so a request without a validated department never reaches
//! the retriever or the store.

use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::generate::AnswerGenerator;
use crate::models::{Chunk, Department};
use crate::retrieve::ScopedRetriever;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieve,
    Generate,
}

/// Per-request state. Owned by a single [`Pipeline::run`] call.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,
    pub stage: Stage,
    pub question: String,
    pub department: Department,
    pub context: Vec<Chunk>,
    pub answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub question: String,
    pub department: Option<Department>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAnswer {
    pub answer: String,
    pub department: Department,
}

pub struct Pipeline {
    retriever: ScopedRetriever,
    generator: AnswerGenerator,
}

impl Pipeline {
    pub fn new(retriever: ScopedRetriever, generator: AnswerGenerator) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub async fn run(&self, request: ChatRequest) -> PipelineResult<ChatAnswer> {
        let department = request.department.ok_or(PipelineError::AccessDenied)?;
        let question = request.question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidQuestion(
                "question must not be empty".to_string(),
            ));
        }

        let mut state = RunState {
            run_id: Uuid::new_v4(),
            stage: Stage::Retrieve,
            question: question.to_string(),
            department,
            context: Vec::new(),
            answer: None,
        };

        state.context = self
            .retriever
            .retrieve(&state.question, &state.department)
            .await;
        tracing::info!(
            run_id = %state.run_id,
            department = %state.department,
            chunks = state.context.len(),
            "retrieval complete"
        );

        state.stage = Stage::Generate;
        let answer = self
            .generator
            .generate(&state.question, &state.context)
            .await?;
        state.answer = Some(answer.clone());
        tracing::info!(run_id = %state.run_id, stage = ?state.stage, "answer generated");

        Ok(ChatAnswer {
            answer,
            department: state.department,
        })
    }
}
