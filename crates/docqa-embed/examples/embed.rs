use docqa_core::config::Config;
use docqa_embed::embedder_from_settings;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let settings = Config::load()?.settings()?;
    let embedder = embedder_from_settings(&settings.embedding)?;
    let texts = vec!["hello world".to_string(), "rust embeddings".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("B={} dim={}", embs.len(), embedder.dim());
    Ok(())
}
