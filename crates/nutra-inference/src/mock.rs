//! Mock embedding backend for deterministic testing.
//!
//! Provides a mock implementation of [`EmbeddingBackend`] that generates
//! deterministic embeddings for testing purposes.
//!
//! ## Usage
//!
//! ```rust
//! use nutra_inference::mock::MockBackend;
//! use nutra_core::EmbeddingBackend;
//!
//! #[tokio::test]
//! async fn test_with_mock_backend() {
//!     let backend = MockBackend::new().with_dimension(384);
//!
//!     let vector = backend.embed("test text").await.unwrap();
//!     assert_eq!(vector.as_slice().len(), 384);
//! }
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nutra_core::{EmbeddingBackend, Error, Result, Vector};

/// Mock embedding backend for testing.
#[derive(Clone)]
pub struct MockBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    model: String,
    latency_ms: u64,
    failure_rate: f64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: nutra_core::defaults::EMBED_DIMENSION,
            model: "mock-embed".to_string(),
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }
}

impl MockBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Set the reported model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    /// Get number of embed calls.
    pub fn embed_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "embed")
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
            timestamp: std::time::Instant::now(),
        });
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        if self.config.failure_rate > 0.0 {
            rand::thread_rng().gen::<f64>() < self.config.failure_rate
        } else {
            false
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        for text in texts {
            self.log_call("embed", text);
        }
        self.simulate_latency().await;

        if self.should_fail() {
            return Err(Error::EmbeddingUnavailable(
                "Simulated failure for testing".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|t| Vector::from(MockEmbeddingGenerator::generate(t, self.config.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.failure_rate < 1.0)
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// will always produce the same embedding.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];

        // Use character codes to generate deterministic values
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        // Normalize to unit vector
        Self::normalize(&mut vec);
        vec
    }

    /// Generate embedding from seed (for random-like but deterministic vectors).
    pub fn generate_with_seed(seed: u64, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        let mut state = seed;

        // Simple LCG for deterministic pseudo-random values
        for item in vec.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *item = ((state % 1000) as f32) / 1000.0 - 0.5;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate embeddings with controlled similarity.
    ///
    /// Creates two embeddings with specified cosine similarity (0.0 to 1.0).
    pub fn generate_similar_pair(
        base_text: &str,
        dimension: usize,
        similarity: f64,
    ) -> (Vec<f32>, Vec<f32>) {
        let base = Self::generate(base_text, dimension);
        let mut similar = Self::generate_with_seed(12345, dimension);

        // Interpolate between base and random vector to achieve target similarity
        let alpha = similarity as f32;
        for i in 0..dimension {
            similar[i] = alpha * base[i] + (1.0 - alpha) * similar[i];
        }

        Self::normalize(&mut similar);
        (base, similar)
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}
