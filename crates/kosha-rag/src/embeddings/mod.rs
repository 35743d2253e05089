use anyhow::Result;
use async_trait::async_trait;

/// Seam to the external embedding service. The engine never selects or
/// loads a model; it only requires a fixed dimension and unit vectors.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query (with whatever prefix the model expects).
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a document/passage.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed documents for ingestion.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_document(text).await?);
        }
        Ok(out)
    }

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Deterministic embedder for tests: folds bytes of the lowercased
    /// text into a fixed-dimension unit vector. Similar strings produce
    /// identical vectors only when equal, which is all the tests need.
    pub struct HashedEmbedder {
        pub dimension: usize,
    }

    impl HashedEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self { dimension }
        }

        fn embed(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; self.dimension];
            for (i, byte) in text.to_lowercase().bytes().enumerate() {
                v[i % self.dimension] += f32::from(byte) / 255.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            v
        }
    }

    #[async_trait]
    impl EmbeddingModel for HashedEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self.embed(text))
        }

        async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self.embed(text))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }
}
