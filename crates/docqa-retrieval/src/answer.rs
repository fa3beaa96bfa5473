//! Grounded answer generation on top of the retriever.
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use docqa_core::metrics::MetricsCollector;
use docqa_core::traits::{LlmClient, TextStream};
use docqa_core::types::Chunk;

use crate::intent::QueryIntent;
use crate::orchestrator::{render_context, Retrieval, Retriever};

/// Exact reply when nothing relevant was retrieved.
pub const FALLBACK_ANSWER: &str = "Answer not found in uploaded documents.";

const HISTORY_TURNS: usize = 5;
const NO_HISTORY: &str = "No previous history.";

const STRICT_INSTRUCTION: &str = "IMPORTANT: Answer ONLY from the information in the provided Context. \
Do NOT use outside knowledge. If the answer is NOT present in the Context, \
respond exactly with: \"Answer not found in uploaded documents.\"";

const VISUAL_RULES: &str = "**Images:**\n\
- Some context entries carry an `[Image Reference: ...]` line. When one of them illustrates the answer, mention it by its source name.\n\
- Only reference images that appear in the Context. Never invent image paths.";

const NO_IMAGES_RULE: &str = "**Images:** The user asked for no images. Do not reference, describe or link any image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Role {
    Teacher,
    Interviewer,
    #[default]
    Research,
    Debugger,
}

impl Role {
    fn instructions(self) -> &'static str {
        match self {
            Role::Teacher => "You are an expert Teacher. Explain the provided context the way a good teacher would.\n\n\
**Instructions:**\n\
- Use Markdown (bold, lists).\n\
- Use analogies and real-world examples.\n\
- Break down jargon.\n\
- **End with a bolded 'Key Takeaway' list.**\n\
- If the answer is not in the context, say that you can only teach from the provided material.",
            Role::Interviewer => "You are a rigorous Technical Interviewer and resume reviewer.\n\n\
**Instructions:**\n\
- When asked for candidate analysis or weaknesses, give a **SWOT analysis** (Strengths, Weaknesses, Opportunities, Threats).\n\
- Be critical but fair. Point out specific missing skills or red flags found in the resume context.\n\
- Structure the evaluation with Markdown.\n\
- Finish with 3 numbered, challenging follow-up questions for the candidate.\n\
- If a detail is not in the context, say it is missing. Do not make it up.",
            Role::Research => "You are a meticulous Research Scientist.\n\n\
**Instructions:**\n\
- Give formal, evidence-based answers strictly from the context.\n\
- Organize complex data in Markdown tables or lists.\n\
- **Comparisons**: identify every entity being compared and look for information about EACH one. If an entity has no information in the context, say so explicitly.\n\
- **Resume comparisons**:\n  \
1. Use the resume sections: Experience, Skills, Education, Projects, Certifications\n  \
2. Show side by side what each person has\n  \
3. List what one resume has and the other lacks\n  \
4. Recommend concrete updates for each resume\n  \
5. Use only resume/CV documents and ignore notes or tutorials\n\
- If the context is insufficient, output: \"> [!IMPORTANT]\\n> Insufficient evidence in knowledge base.\"\n\
- Keep a neutral, objective tone.",
            Role::Debugger => "You are a Senior Principal Engineer debugging code.\n\n\
**Instructions:**\n\
- Treat the `Context` as the authoritative code and do NOT use outside knowledge.\n\
- Quote every problematic line from the Context in a Markdown code block, with 1-2 surrounding lines where possible.\n\
- For each quoted line name the exact token, variable or character range that is wrong and explain precisely what is wrong.\n\
- Give a minimal fix as corrected line(s) in a code block plus a one-sentence rationale.\n\
- If no relevant issue can be found in the Context, respond exactly with: \"Answer not found in uploaded documents.\" and nothing else.\n\
- End with a 1-2 line summary of the root cause and fix.",
        }
    }

    fn context_label(self) -> &'static str {
        match self {
            Role::Interviewer => "Context (Resume/Documents)",
            _ => "Context",
        }
    }

    fn query_label(self) -> &'static str {
        match self {
            Role::Teacher => "User Question",
            Role::Interviewer => "User Input",
            Role::Research => "User Request",
            Role::Debugger => "User Code/Issue",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Teacher => "teacher",
            Role::Interviewer => "interviewer",
            Role::Research => "research",
            Role::Debugger => "debugger",
        };
        f.write_str(name)
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts `teacher`, `Teacher AI` and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let key = key.strip_suffix(" ai").unwrap_or(&key);
        match key {
            "teacher" => Ok(Role::Teacher),
            "interviewer" => Ok(Role::Interviewer),
            "research" => Ok(Role::Research),
            "debugger" => Ok(Role::Debugger),
            other => Err(format!("unknown role '{other}' (expected teacher, interviewer, research or debugger)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

/// An image the answer may point at, titled by its file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSource {
    pub image_url: String,
    pub title: String,
}

/// Distinct image references in rank order. Empty when the user asked for no images.
pub fn image_sources(chunks: &[Chunk], intent: &QueryIntent) -> Vec<ImageSource> {
    if intent.visual_suppressed {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter_map(|c| {
            let url = c.metadata.image_url.as_deref().filter(|u| !u.is_empty())?;
            seen.insert(url.to_string()).then(|| ImageSource {
                image_url: url.to_string(),
                title: if c.metadata.file_name.is_empty() { "Document".to_string() } else { c.metadata.file_name.clone() },
            })
        })
        .collect()
}

/// Last turns as `role: content` lines.
pub fn format_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }
    let start = history.len().saturating_sub(HISTORY_TURNS);
    history[start..].iter().map(|t| format!("{}: {}", t.role, t.content)).collect::<Vec<_>>().join("\n")
}

/// Full system prompt: grounding instruction, role template, image rule.
pub fn system_prompt(role: Role, intent: &QueryIntent, context: &str, history: &str, query: &str) -> String {
    let mut prompt = format!(
        "{STRICT_INSTRUCTION}\n\n{}\n\n**{}:**\n{context}\n\n**History:**\n{history}\n\n**{}:** {query}",
        role.instructions(),
        role.context_label(),
        role.query_label(),
    );
    if intent.visual_suppressed {
        prompt.push_str("\n\n");
        prompt.push_str(NO_IMAGES_RULE);
    } else if intent.is_visual {
        prompt.push_str("\n\n");
        prompt.push_str(VISUAL_RULES);
    }
    prompt
}

/// A generated answer: what was retrieved, the images worth showing, and the text stream.
pub struct Answer {
    pub retrieval: Retrieval,
    pub sources: Vec<ImageSource>,
    pub stream: TextStream,
}

pub struct AnswerService {
    retriever: Retriever,
    llm: Arc<dyn LlmClient>,
}

impl AnswerService {
    pub fn new(retriever: Retriever, llm: Arc<dyn LlmClient>) -> Self {
        Self { retriever, llm }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Never fails: an empty context yields [`FALLBACK_ANSWER`], an LLM failure yields an apology fragment.
    pub async fn answer(&self, query: &str, role: Role, history: &[ChatTurn]) -> Answer {
        let retrieval = self.retriever.retrieve_with_intent(query).await;
        let context = render_context(&retrieval);
        let sources = image_sources(&retrieval.chunks, &retrieval.intent);
        if context.trim().is_empty() {
            tracing::info!("Empty context for query, answering with fallback");
            return Answer { retrieval, sources, stream: single(FALLBACK_ANSWER.to_string()) };
        }

        let history = format_history(history);
        let prompt = system_prompt(role, &retrieval.intent, &context, &history, &retrieval.original_query);
        tracing::debug!("System prompt ({} chars) for role {}", prompt.len(), role);

        let start = Instant::now();
        let metrics = Arc::clone(self.retriever.metrics());
        let stream = match self.llm.complete(&prompt, &retrieval.original_query).await {
            Ok(inner) => timed(inner, start, metrics),
            Err(e) => {
                tracing::error!("Error calling LLM: {:#}", e);
                metrics.record_generation(start.elapsed());
                single(apology(&e))
            }
        };
        Answer { retrieval, sources, stream }
    }

    /// Convenience for callers that want the whole answer as one string.
    pub async fn answer_text(&self, query: &str, role: Role, history: &[ChatTurn]) -> String {
        let answer = self.answer(query, role, history).await;
        answer
            .stream
            .filter_map(|r| async move { r.ok() })
            .collect::<Vec<_>>()
            .await
            .concat()
    }
}

fn apology(e: &anyhow::Error) -> String {
    format!("I'm sorry, I encountered an error: {e}")
}

fn single(text: String) -> TextStream {
    stream::once(async move { Ok(text) }).boxed()
}

struct Generation {
    inner: TextStream,
    start: Instant,
    metrics: Arc<MetricsCollector>,
    finished: bool,
}

impl Generation {
    fn finish(&mut self) {
        self.finished = true;
        self.metrics.record_generation(self.start.elapsed());
    }
}

/// Passes fragments through, turns a mid-stream error into a final apology
/// fragment, and records generation latency once the stream ends.
fn timed(inner: TextStream, start: Instant, metrics: Arc<MetricsCollector>) -> TextStream {
    let state = Generation { inner, start, metrics, finished: false };
    stream::unfold(state, |mut g| async move {
        if g.finished {
            return None;
        }
        match g.inner.next().await {
            Some(Ok(text)) => Some((Ok(text), g)),
            Some(Err(e)) => {
                tracing::error!("LLM stream failed: {:#}", e);
                g.finish();
                Some((Ok(apology(&e)), g))
            }
            None => {
                g.finish();
                tracing::info!("Answer generated in {:?}", g.start.elapsed());
                None
            }
        }
    })
    .boxed()
}
