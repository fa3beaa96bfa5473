//! Provenance-annotated context for the generation prompt.
use docqa_core::types::Chunk;

pub const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

fn header(chunk: &Chunk) -> String {
    match chunk.metadata.page {
        Some(page) => format!("[Source: {} (Pg {})]", chunk.display_name(), page),
        None => format!("[Source: {}]", chunk.display_name()),
    }
}

fn flatten(content: &str) -> String {
    content.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ")
}

fn render(chunks: &[Chunk], with_images: bool) -> String {
    chunks
        .iter()
        .map(|c| {
            let mut block = header(c);
            block.push('\n');
            if with_images {
                if let Some(url) = c.metadata.image_url.as_deref().filter(|u| !u.is_empty()) {
                    block.push_str(&format!("[Image Reference: {}]\n", url));
                }
            }
            block.push_str(&flatten(&c.content));
            block
        })
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

/// One block per chunk: source header, optional image line, flattened content.
/// Empty input gives an empty string.
pub fn assemble(chunks: &[Chunk]) -> String {
    render(chunks, true)
}

/// Same as [`assemble`] but never emits image references.
pub fn assemble_without_images(chunks: &[Chunk]) -> String {
    render(chunks, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(assemble(&[]), "");
    }

    #[test]
    fn paged_chunk_with_image() {
        let c = Chunk::from_text("/uploads/doc1.pdf", 0, "Sales grew\n\nin Q3.\n").with_page(1).with_image_url("/static/graph.jpg");
        assert_eq!(assemble(&[c]), "[Source: doc1.pdf (Pg 1)]\n[Image Reference: /static/graph.jpg]\nSales grew in Q3.");
    }

    #[test]
    fn blocks_are_separated() {
        let a = Chunk::from_text("/d/a.txt", 0, "one");
        let b = Chunk::from_text("/d/b.txt", 0, "two");
        assert_eq!(assemble(&[a, b]), "[Source: a.txt]\none\n\n---\n\n[Source: b.txt]\ntwo");
    }

    #[test]
    fn image_lines_can_be_dropped() {
        let c = Chunk::from_text("/d/a.pdf", 0, "x").with_image_url("/static/a.png");
        assert_eq!(assemble_without_images(&[c]), "[Source: a.pdf]\nx");
    }
}
