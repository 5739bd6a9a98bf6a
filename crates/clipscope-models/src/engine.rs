//! Scoring one image against one model and one prompt batch

use crate::backend::{ImagePreprocessor, PromptTokenizer, VisionLanguageModel};
use candle_core::{DType, Tensor, D};
use clipscope_core::{Error, RankedScores, Result};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Image and prompts converted once, reusable across models
pub struct PreparedInputs {
    prompts: Vec<String>,
    pixels: Tensor,
    tokens: Tensor,
}

impl PreparedInputs {
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

/// Runs the joint image/text scoring and ranks the resulting distribution
pub struct PredictionEngine {
    preprocessor: Arc<dyn ImagePreprocessor>,
    tokenizer: Arc<dyn PromptTokenizer>,
}

impl PredictionEngine {
    pub fn new(preprocessor: Arc<dyn ImagePreprocessor>, tokenizer: Arc<dyn PromptTokenizer>) -> Self {
        Self {
            preprocessor,
            tokenizer,
        }
    }

    /// Preprocess the image and tokenize the prompts
    pub fn prepare(&self, image: &DynamicImage, prompts: &[String]) -> Result<PreparedInputs> {
        let pixels = self.preprocessor.preprocess(image).map_err(into_prediction)?;
        let tokens = self.tokenizer.tokenize(prompts).map_err(into_prediction)?;

        Ok(PreparedInputs {
            prompts: prompts.to_vec(),
            pixels,
            tokens,
        })
    }

    /// Softmax over the prompts for one model, ranked by probability
    pub fn score(&self, inputs: &PreparedInputs, model: &dyn VisionLanguageModel) -> Result<RankedScores> {
        let start = Instant::now();
        let n = inputs.prompts.len();

        let logits = model
            .logits_per_image(&inputs.pixels, &inputs.tokens)
            .map_err(into_prediction)?;

        if logits.dims() != [1, n] {
            return Err(Error::prediction(format!(
                "expected logits of shape [1, {}], got {:?}",
                n,
                logits.dims()
            )));
        }

        let probabilities = logits
            .to_dtype(DType::F32)
            .and_then(|l| candle_nn::ops::softmax(&l, D::Minus1))
            .and_then(|p| p.squeeze(0))
            .and_then(|p| p.to_vec1::<f32>())
            .map_err(|e| Error::prediction(e.to_string()))?;

        let elapsed = start.elapsed();
        metrics::histogram!("clipscope_prediction_latency_us").record(elapsed.as_micros() as f64);
        debug!("Scored {} prompts in {:?}", n, elapsed);

        Ok(RankedScores::from_scores(
            inputs.prompts.iter().cloned().zip(probabilities),
        ))
    }

    /// `prepare` then `score`
    pub fn predict_one(
        &self,
        image: &DynamicImage,
        prompts: &[String],
        model: &dyn VisionLanguageModel,
    ) -> Result<RankedScores> {
        let inputs = self.prepare(image, prompts)?;
        self.score(&inputs, model)
    }
}

fn into_prediction(e: Error) -> Error {
    match e {
        Error::Prediction(_) => e,
        other => Error::prediction(other.to_string()),
    }
}
