#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scoped_rag::config::{IndexingConfig, RetrievalConfig};
use scoped_rag::embedding::EmbeddingProvider;
use scoped_rag::extract::BuiltinConverter;
use scoped_rag::generate::{AnswerGenerator, DECLINE_MESSAGE, NO_CONTEXT};
use scoped_rag::indexer::Indexer;
use scoped_rag::llm::ChatModel;
use scoped_rag::pipeline::Pipeline;
use scoped_rag::retrieve::ScopedRetriever;
use scoped_rag::store::{InMemoryStore, VectorStore};

const VOCAB: [&str; 6] = ["vacation", "leave", "budget", "expense", "holiday", "laptop"];

/// Bag-of-keywords embedder: one dimension per vocabulary word.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keywords"
    }
    fn dims(&self) -> Option<usize> {
        Some(VOCAB.len())
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCAB
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Chat model that records prompts. Declines when the context is the
/// empty sentinel, otherwise echoes the first grounding line.
#[derive(Default)]
pub struct ScriptedChatModel {
    pub prompts: Mutex<Vec<String>>,
    pub fail: bool,
}

impl ScriptedChatModel {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        if self.fail {
            bail!("upstream 500: secret internal detail");
        }
        let first = user.lines().nth(1).unwrap_or_default();
        if first == NO_CONTEXT {
            Ok(DECLINE_MESSAGE.to_string())
        } else {
            Ok(format!("Answer from {}", first))
        }
    }
}

pub const HR_POLICY: &str = "Employees receive 25 vacation days per year. Unused vacation days can be carried over until March.";
pub const FINANCE_BUDGET: &str = "The quarterly budget review happens in the first week. Every expense above 500 EUR needs approval from the budget owner.";
pub const GENERAL_HOLIDAYS: &str = "The office is closed on every public holiday. The holiday calendar is published each January.";
pub const LOOSE_NOTES: &str = "Scratch notes about vacation planning for the team offsite next year, not an official policy.";

/// Lay out a small library under `<dir>/downloads` and return its root.
pub fn write_library(dir: &Path) -> PathBuf {
    let root = dir.join("downloads");
    for (rel, body) in [
        ("HR/leave_policy.md", HR_POLICY),
        ("Finance/budget.md", FINANCE_BUDGET),
        ("General/holidays.txt", GENERAL_HOLIDAYS),
        ("notes.md", LOOSE_NOTES),
    ] {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }
    root
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub embedder: Arc<KeywordEmbedder>,
    pub chat: Arc<ScriptedChatModel>,
    pub indexer: Indexer,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(root: &Path, chat: ScriptedChatModel) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(KeywordEmbedder::default());
        let chat = Arc::new(chat);

        let indexer = Indexer::new(
            store.clone() as Arc<dyn VectorStore>,
            embedder.clone(),
            Arc::new(BuiltinConverter),
            root,
            IndexingConfig::default(),
        );
        let retriever = ScopedRetriever::new(
            store.clone(),
            embedder.clone(),
            &RetrievalConfig::default(),
        );
        let pipeline = Pipeline::new(retriever, AnswerGenerator::new(chat.clone()));

        Self {
            store,
            embedder,
            chat,
            indexer,
            pipeline,
        }
    }
}
