//! ONNX Runtime backed predictor.

use super::SegmentationPredictor;
use crate::core::batch::Tensor4D;
use crate::core::config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
use crate::core::errors::{SegError, SegResult, SimpleError};
use ort::{
    execution_providers::ExecutionProviderDispatch,
    logging::LogLevel,
    session::{Session, builder::SessionBuilder},
    value::TensorRef,
};
use std::path::{Path, PathBuf};

/// A segmentation model exported to ONNX.
///
/// The model takes a single (B, 1, H, W) float input and produces a
/// (B, C, h, w) float score tensor as its first output.
pub struct OrtPredictor {
    session: Session,
    input_name: String,
    output_name: String,
    num_classes: usize,
    model_path: PathBuf,
    model_name: String,
}

impl OrtPredictor {
    /// Loads a model and applies the session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SegError::ModelLoad`] when the file is missing, cannot be
    /// parsed by ONNX Runtime, or has no inputs or outputs.
    pub fn from_file(
        model_path: impl AsRef<Path>,
        num_classes: usize,
        config: &OrtSessionConfig,
    ) -> SegResult<Self> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SegError::model_load(path, "model file does not exist", None));
        }

        let builder = Session::builder()?.with_log_level(LogLevel::Error)?;
        let session = Self::apply_ort_config(builder, config)
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                SegError::model_load(path, "failed to create ONNX session", Some(Box::new(e)))
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| SegError::model_load(path, "model declares no inputs", None))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| SegError::model_load(path, "model declares no outputs", None))?;

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        tracing::info!(
            "loaded ONNX model '{}' (input '{}', output '{}')",
            model_name,
            input_name,
            output_name
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            num_classes,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the model path.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn apply_ort_config(
        mut builder: SessionBuilder,
        cfg: &OrtSessionConfig,
    ) -> Result<SessionBuilder, ort::Error> {
        if let Some(intra) = cfg.intra_threads {
            builder = builder.with_intra_threads(intra)?;
        }
        if let Some(inter) = cfg.inter_threads {
            builder = builder.with_inter_threads(inter)?;
        }
        if let Some(level) = cfg.optimization_level {
            use ort::session::builder::GraphOptimizationLevel as GOL;
            let mapped = match level {
                OrtGraphOptimizationLevel::DisableAll => GOL::Disable,
                OrtGraphOptimizationLevel::Level1 => GOL::Level1,
                OrtGraphOptimizationLevel::Level2 => GOL::Level2,
                OrtGraphOptimizationLevel::Level3 => GOL::Level3,
            };
            builder = builder.with_optimization_level(mapped)?;
        }
        let providers = Self::build_execution_providers(&cfg.get_execution_providers())?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
        Ok(builder)
    }

    fn build_execution_providers(
        eps: &[OrtExecutionProvider],
    ) -> Result<Vec<ExecutionProviderDispatch>, ort::Error> {
        let mut providers = Vec::new();
        for ep in eps {
            match ep {
                OrtExecutionProvider::CPU => {
                    providers
                        .push(ort::execution_providers::CPUExecutionProvider::default().build());
                }
                #[cfg(feature = "cuda")]
                OrtExecutionProvider::CUDA { device_id } => {
                    let mut cuda = ort::execution_providers::CUDAExecutionProvider::default();
                    if let Some(id) = device_id {
                        cuda = cuda.with_device_id(*id);
                    }
                    providers.push(cuda.build());
                }
                #[cfg(feature = "tensorrt")]
                OrtExecutionProvider::TensorRT {
                    device_id,
                    fp16_enable,
                } => {
                    let mut trt = ort::execution_providers::TensorRTExecutionProvider::default();
                    if let Some(id) = device_id {
                        trt = trt.with_device_id(*id);
                    }
                    if let Some(fp16) = fp16_enable {
                        trt = trt.with_fp16(*fp16);
                    }
                    providers.push(trt.build());
                }
                #[cfg(not(feature = "cuda"))]
                OrtExecutionProvider::CUDA { .. } => {
                    return Err(ort::Error::new(
                        "CUDA execution provider requested but cuda feature is not enabled",
                    ));
                }
                #[cfg(not(feature = "tensorrt"))]
                OrtExecutionProvider::TensorRT { .. } => {
                    return Err(ort::Error::new(
                        "TensorRT execution provider requested but tensorrt feature is not enabled",
                    ));
                }
            }
        }
        Ok(providers)
    }
}

impl SegmentationPredictor for OrtPredictor {
    fn forward(&mut self, batch: &Tensor4D) -> SegResult<Tensor4D> {
        let input_tensor = TensorRef::from_array_view(batch.view())?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];
        let outputs = self.session.run(inputs)?;

        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        if shape.len() != 4 {
            return Err(SegError::inference(
                0,
                format!(
                    "model '{}' returned a {}D output, expected 4D",
                    self.model_name,
                    shape.len()
                ),
                SimpleError::new("invalid output rank"),
            ));
        }
        let dims = (
            shape[0] as usize,
            shape[1] as usize,
            shape[2] as usize,
            shape[3] as usize,
        );
        Ok(Tensor4D::from_shape_vec(dims, data.to_vec())?)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for OrtPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtPredictor")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_model_load_error() {
        let err = OrtPredictor::from_file(
            "/nonexistent/model.onnx",
            10,
            &OrtSessionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SegError::ModelLoad { .. }));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_provider_requires_feature() {
        let result = OrtPredictor::build_execution_providers(&[OrtExecutionProvider::CUDA {
            device_id: Some(0),
        }]);
        assert!(result.is_err());
    }
}
