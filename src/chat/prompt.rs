//! Prompt rendering.
//!
//! Rendering is a pure function of the template, the retrieved chunks, the
//! history and the question, so identical inputs give byte-identical prompts.
use super::memory::Turn;
use crate::indexer::chunker::Chunk;
use crate::llm::Prompt;

const CONTEXT: &str = "{context}";
const CHAT_HISTORY: &str = "{chat_history}";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
        }
    }

    pub fn render<'a, I>(&self, chunks: I, history: &[Turn], question: &str) -> Prompt
    where
        I: IntoIterator<Item = &'a Chunk>,
    {
        let context = render_context(chunks);
        let chat_history = render_history(history);
        Prompt {
            system: fill(&self.system, &context, &chat_history),
            user: question.to_string(),
        }
    }
}

/// Chunk texts separated by a blank line.
pub fn render_context<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a Chunk>,
{
    chunks
        .into_iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `Human:` / `AI:` lines, oldest turn first.
pub fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| format!("Human: {}\nAI: {}", t.question, t.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitute both placeholders in one left-to-right pass. Substituted text
/// is never scanned again, so documents containing `{chat_history}` stay
/// literal.
fn fill(template: &str, context: &str, chat_history: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + chat_history.len());
    let mut rest = template;
    loop {
        let next = [(CONTEXT, context), (CHAT_HISTORY, chat_history)]
            .into_iter()
            .filter_map(|(key, value)| rest.find(key).map(|pos| (pos, key, value)))
            .min_by_key(|(pos, _, _)| *pos);

        match next {
            Some((pos, key, value)) => {
                out.push_str(&rest[..pos]);
                out.push_str(value);
                rest = &rest[pos + key.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
