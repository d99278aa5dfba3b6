pub mod interpret;
pub mod model;
pub mod normalize;

pub use interpret::interpret;
pub use model::{Classifier, InferenceError, RawPrediction};
pub use normalize::{DecodeError, NormalizedTensor, ResizeMethod, normalize};
