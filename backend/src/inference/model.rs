use shared::CLASS_LABELS;
use std::time::Duration;

use super::normalize::NormalizedTensor;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("input shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: [usize; 4],
        actual: [usize; 4],
    },
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
    #[error("model runtime error: {0}")]
    Backend(String),
    #[error("inference did not finish within {0:?}")]
    Timeout(Duration),
}

#[cfg(feature = "torch")]
impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Backend(err.to_string())
    }
}

/// Raw model output for a single image.
///
/// Construction checks that the output can be interpreted: a batch of one,
/// a trailing dimension between 1 and the number of known classes, and
/// finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    shape: Vec<usize>,
    values: Vec<f32>,
}

impl RawPrediction {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self, InferenceError> {
        let Some(&trailing) = shape.last() else {
            return Err(InferenceError::UnexpectedOutput("scalar output".into()));
        };
        if shape.iter().product::<usize>() != values.len() {
            return Err(InferenceError::UnexpectedOutput(format!(
                "shape {:?} holds {} values",
                shape,
                values.len()
            )));
        }
        if trailing == 0 || values.len() != trailing {
            return Err(InferenceError::UnexpectedOutput(format!(
                "expected a single prediction, got shape {:?}",
                shape
            )));
        }
        if trailing > CLASS_LABELS.len() {
            return Err(InferenceError::UnexpectedOutput(format!(
                "{} output units for {} classes",
                trailing,
                CLASS_LABELS.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::UnexpectedOutput(format!(
                "non-finite values {:?}",
                values
            )));
        }
        Ok(Self { shape, values })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Size of the last dimension: 1 for a sigmoid head, the class count for softmax.
    pub fn trailing_dim(&self) -> usize {
        self.values.len()
    }
}

/// A loaded classifier. One instance is shared by every request, so
/// implementations must not need `&mut self` to run.
pub trait Classifier: Send + Sync {
    /// Expected input as `[batch, height, width, channels]`.
    fn input_shape(&self) -> [usize; 4];

    fn infer(&self, tensor: &NormalizedTensor) -> Result<RawPrediction, InferenceError>;

    fn check_input(&self, tensor: &NormalizedTensor) -> Result<(), InferenceError> {
        let expected = self.input_shape();
        let actual = tensor.shape();
        if expected != actual {
            return Err(InferenceError::ShapeMismatch { expected, actual });
        }
        Ok(())
    }
}

#[cfg(feature = "torch")]
pub use torch::TorchModel;

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use std::sync::Mutex;
    use tch::{CModule, Device, Kind, Tensor};

    use super::{Classifier, InferenceError, RawPrediction};
    use crate::config::DevicePreference;
    use crate::inference::normalize::NormalizedTensor;

    /// TorchScript classifier fed with NHWC float tensors.
    pub struct TorchModel {
        module: Mutex<CModule>,
        device: Device,
        input_shape: [usize; 4],
    }

    impl TorchModel {
        pub fn load(
            path: &Path,
            device: DevicePreference,
            input_shape: [usize; 4],
        ) -> Result<Self, tch::TchError> {
            let device = match device {
                DevicePreference::Auto => Device::cuda_if_available(),
                DevicePreference::Cpu => Device::Cpu,
                DevicePreference::Cuda => Device::Cuda(0),
            };
            let mut module = CModule::load_on_device(path, device)?;
            module.set_eval();
            log::info!("Loaded TorchScript module from {} on {:?}", path.display(), device);
            Ok(Self {
                module: Mutex::new(module),
                device,
                input_shape,
            })
        }
    }

    impl Classifier for TorchModel {
        fn input_shape(&self) -> [usize; 4] {
            self.input_shape
        }

        fn infer(&self, tensor: &NormalizedTensor) -> Result<RawPrediction, InferenceError> {
            self.check_input(tensor)?;

            let dims: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
            let input = Tensor::from_slice(&tensor.to_vec())
                .f_view(dims)?
                .to_device(self.device);

            let output = {
                let module = self
                    .module
                    .lock()
                    .map_err(|_| InferenceError::Backend("model lock poisoned".into()))?;
                tch::no_grad(|| module.forward_ts(&[input]))?
            };

            let shape: Vec<usize> = output.size().iter().map(|&d| d as usize).collect();
            let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).f_view([-1])?;
            let num_elements = output_flat.size()[0] as usize;
            let mut values = vec![0.0f32; num_elements];
            output_flat.f_copy_data(&mut values, num_elements)?;

            RawPrediction::new(shape, values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    struct FixedOutput(Vec<f32>);

    impl Classifier for FixedOutput {
        fn input_shape(&self) -> [usize; 4] {
            [1, 4, 4, 3]
        }

        fn infer(&self, tensor: &NormalizedTensor) -> Result<RawPrediction, InferenceError> {
            self.check_input(tensor)?;
            RawPrediction::new(vec![1, self.0.len()], self.0.clone())
        }
    }

    #[test]
    fn accepts_sigmoid_and_softmax_heads() {
        let sigmoid = RawPrediction::new(vec![1, 1], vec![0.7]).unwrap();
        assert_eq!(sigmoid.trailing_dim(), 1);

        let softmax = RawPrediction::new(vec![1, 2], vec![0.4, 0.6]).unwrap();
        assert_eq!(softmax.trailing_dim(), 2);
        assert_eq!(softmax.shape(), &[1, 2]);
    }

    #[test]
    fn rejects_outputs_that_cannot_be_interpreted() {
        assert!(RawPrediction::new(vec![], vec![]).is_err());
        assert!(RawPrediction::new(vec![1, 2], vec![0.5]).is_err());
        assert!(RawPrediction::new(vec![2, 1], vec![0.1, 0.9]).is_err());
        assert!(RawPrediction::new(vec![1, 3], vec![0.2, 0.3, 0.5]).is_err());
        assert!(RawPrediction::new(vec![1, 0], vec![]).is_err());
        assert!(RawPrediction::new(vec![1, 1], vec![f32::NAN]).is_err());
    }

    #[test]
    fn shape_mismatch_is_a_hard_failure() {
        let model = FixedOutput(vec![0.2, 0.8]);
        let wrong = NormalizedTensor::from_array(Array4::zeros((1, 8, 8, 3)));

        match model.infer(&wrong) {
            Err(InferenceError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, [1, 4, 4, 3]);
                assert_eq!(actual, [1, 8, 8, 3]);
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }

        let right = NormalizedTensor::from_array(Array4::zeros((1, 4, 4, 3)));
        assert_eq!(model.infer(&right).unwrap().values(), &[0.2, 0.8]);
    }
}
