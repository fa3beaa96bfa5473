//! Streaming chat client for OpenAI-compatible `/chat/completions` endpoints.
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use docqa_core::config::LlmSettings;
use docqa_core::error::Error;
use docqa_core::traits::{LlmClient, TextStream};

mod sse;

pub use sse::{SseDecoder, SseEvent};

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    stream: bool,
}

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl OpenAiCompatClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        if settings.base_url.trim().is_empty() {
            return Err(Error::Configuration("llm.base_url is empty".into()).into());
        }
        let http = http_builder(&settings).build().context("building HTTP client")?;
        Ok(Self { http, settings })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

/// Bounds connecting and each read of the body, not the whole response,
/// so long answers can keep streaming.
fn http_builder(settings: &LlmSettings) -> reqwest::ClientBuilder {
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));
    reqwest::Client::builder().connect_timeout(timeout).read_timeout(timeout)
}

struct Decoding<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Turns a raw response body into content fragments. Stops at `[DONE]` or end of body.
fn decode_body<S, B, E>(body: S) -> TextStream
where
    S: futures::Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = Decoding { body: Box::pin(body), decoder: SseDecoder::new(), pending: VecDeque::new(), done: false };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for event in st.decoder.push(bytes.as_ref()) {
                        match event {
                            SseEvent::Delta(text) => st.pending.push_back(text),
                            SseEvent::Done => {
                                st.done = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(anyhow::Error::new(e).context("reading completion stream")), st));
                }
                None => {
                    st.done = true;
                    if let Some(SseEvent::Delta(text)) = st.decoder.finish() {
                        st.pending.push_back(text);
                    }
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<TextStream> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                Message { role: "system", content: system_prompt },
                Message { role: "user", content: user_message },
            ],
            temperature: self.settings.temperature,
            stream: true,
        };
        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }
        tracing::debug!("POST {} (model={})", self.endpoint(), self.settings.model);
        let res = builder.send().await.map_err(|e| Error::Llm(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            bail!(Error::Llm(format!("{status}: {text}")));
        }
        Ok(decode_body(res.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&'static str]) -> impl futures::Stream<Item = std::result::Result<&'static [u8], std::io::Error>> + Send {
        stream::iter(parts.iter().copied().map(|p: &'static str| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn fragments_in_order_until_done() {
        let parts = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"Answer \"}}]}\n\ndata: {\"choices\":[{\"delta\":",
            "{\"content\":\"text\"}}]}\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ];
        let out: Vec<String> = decode_body(body(&parts)).map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["Answer ", "text"]);
    }

    #[tokio::test]
    async fn body_without_done_still_ends() {
        let parts = ["data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n", "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}"];
        let out: Vec<String> = decode_body(body(&parts)).map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn transport_error_surfaces_once() {
        let parts: Vec<std::result::Result<&'static [u8], std::io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".as_slice()),
            Err(std::io::Error::other("reset")),
        ];
        let out: Vec<Result<String>> = decode_body(stream::iter(parts)).collect().await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
    }

    async fn read_request(sock: &mut tokio::net::TcpStream) {
        use tokio::io::AsyncReadExt;
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = sock.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + len {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn slow_stream_outlives_timeout() {
        use tokio::io::AsyncWriteExt;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            read_request(&mut sock).await;
            sock.write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n").await.unwrap();
            for word in ["a", "b", "c"] {
                tokio::time::sleep(Duration::from_millis(600)).await;
                let line = format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{word}\"}}}}]}}\n\n");
                sock.write_all(line.as_bytes()).await.unwrap();
                sock.flush().await.unwrap();
            }
            sock.write_all(b"data: [DONE]\n\n").await.unwrap();
            sock.shutdown().await.unwrap();
        });

        let settings = LlmSettings { base_url: format!("http://{addr}"), timeout_secs: 1, ..LlmSettings::default() };
        let http = http_builder(&settings).no_proxy().build().unwrap();
        let client = OpenAiCompatClient { http, settings };
        let out: Vec<String> = client.complete("system", "user").await.unwrap().map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client = OpenAiCompatClient::new(LlmSettings { base_url: "http://localhost:8080/v1/".into(), ..LlmSettings::default() })
            .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert!(OpenAiCompatClient::new(LlmSettings { base_url: " ".into(), ..LlmSettings::default() }).is_err());
    }
}
