//! Retrieval orchestration: query understanding, multi-pass retrieval over a
//! [`DocumentStore`](docqa_core::traits::DocumentStore), reranking, context
//! assembly and grounded answer generation.

pub mod answer;
pub mod context;
pub mod intent;
pub mod orchestrator;
pub mod rerank;
pub mod resume;
pub mod translate;

pub use answer::{Answer, AnswerService, ChatTurn, ImageSource, Role, FALLBACK_ANSWER};
pub use context::{assemble, CHUNK_SEPARATOR};
pub use intent::{classify, QueryIntent, VisualIntent};
pub use orchestrator::{render_context, Retrieval, Retriever};
pub use rerank::{EmbeddingReranker, LexicalReranker, PassthroughReranker};
pub use translate::LlmTranslator;
