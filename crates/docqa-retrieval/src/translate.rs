use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use docqa_core::traits::{LlmClient, Translator};

pub const TRANSLATION_INSTRUCTION: &str =
    "Translate the following text to English. Output only the translation, with no explanations, notes or quotes.";

/// Narrow translation view over a chat model.
pub struct LlmTranslator {
    client: Arc<dyn LlmClient>,
}

impl LlmTranslator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

/// Trims whitespace and one layer of surrounding quotes.
pub fn clean_translation(raw: &str) -> String {
    let trimmed = raw.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”'), ('«', '»')] {
        if let Some(inner) = trimmed.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate_to_english(&self, text: &str) -> anyhow::Result<String> {
        let mut stream = self.client.complete(TRANSLATION_INSTRUCTION, text).await?;
        let mut out = String::new();
        while let Some(fragment) = stream.next().await {
            out.push_str(&fragment?);
        }
        let cleaned = clean_translation(&out);
        if cleaned.is_empty() {
            anyhow::bail!("empty translation");
        }
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::traits::TextStream;
    use futures::stream;

    struct Echo(Vec<&'static str>);

    #[async_trait]
    impl LlmClient for Echo {
        async fn complete(&self, system_prompt: &str, _user: &str) -> anyhow::Result<TextStream> {
            assert_eq!(system_prompt, TRANSLATION_INSTRUCTION);
            let parts: Vec<anyhow::Result<String>> = self.0.iter().map(|s| Ok(s.to_string())).collect();
            Ok(stream::iter(parts).boxed())
        }
    }

    #[test]
    fn quotes_and_whitespace_are_stripped() {
        assert_eq!(clean_translation("  \"Who has more experience?\" \n"), "Who has more experience?");
        assert_eq!(clean_translation("“hello”"), "hello");
        assert_eq!(clean_translation("it's fine"), "it's fine");
    }

    #[tokio::test]
    async fn fragments_are_joined_and_cleaned() {
        let t = LlmTranslator::new(Arc::new(Echo(vec!["\"Compare ", "Alice and Bob\""])));
        assert_eq!(t.translate_to_english("Comparer Alice et Bob").await.unwrap(), "Compare Alice and Bob");
    }

    #[tokio::test]
    async fn empty_output_is_an_error() {
        let t = LlmTranslator::new(Arc::new(Echo(vec!["  "])));
        assert!(t.translate_to_english("héllo").await.is_err());
    }
}
