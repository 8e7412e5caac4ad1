//! ONNX Runtime sentence embeddings for log messages.
//!
//! Mean-pooled, L2-normalized embeddings from a sentence-transformers model
//! (all-MiniLM-L6-v2, 384 dimensions). The model directory must contain
//! `model.onnx` and `tokenizer.json`.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::classifier::TextEmbedder;

/// Longest token sequence fed to the model; longer log lines are truncated.
const MAX_TOKENS: usize = 256;

/// Sentence embedder backed by an ONNX Runtime session.
pub struct Embedder {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
}

impl Embedder {
    /// Load an embedding model from a directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            session,
            tokenizer,
            dim,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed one log message as a unit-length vector.
    pub fn embed(&mut self, text: &str) -> anyhow::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let to_i64 = |v: &[u32]| v.iter().map(|&x| x as i64).collect::<Vec<_>>();
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let token_type_ids = to_i64(encoding.get_type_ids());
        let seq_len = input_ids.len();

        let shape = [1i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))?;
        let type_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => type_tensor,
        ])?;

        // Token embeddings: [1, seq_len, dim].
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] == 1 && dims[2] as usize == self.dim,
            "unexpected output shape: {dims:?}, expected [1, {seq_len}, {}]",
            self.dim
        );

        let tokens = (dims[1] as usize).min(attention_mask.len());
        let mut pooled = vec![0.0f32; self.dim];
        let mut token_count = 0.0f32;
        for (j, &mask) in attention_mask.iter().take(tokens).enumerate() {
            if mask > 0 {
                let row = &output_data[j * self.dim..(j + 1) * self.dim];
                for (p, v) in pooled.iter_mut().zip(row) {
                    *p += v;
                }
                token_count += 1.0;
            }
        }
        if token_count > 0.0 {
            for p in &mut pooled {
                *p /= token_count;
            }
        }
        normalize(&mut pooled);
        Ok(pooled)
    }
}

impl TextEmbedder for Mutex<Embedder> {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut embedder = self
            .lock()
            .map_err(|_| anyhow::anyhow!("embedder lock poisoned"))?;
        embedder.embed(text)
    }
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Last dimension of the model's output tensor, when declared.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
