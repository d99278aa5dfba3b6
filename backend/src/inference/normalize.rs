use image::ImageReader;
use image::imageops::FilterType;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CHANNELS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("cannot read image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Interpolation used when resizing to the model input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl From<ResizeMethod> for FilterType {
    fn from(method: ResizeMethod) -> Self {
        match method {
            ResizeMethod::Nearest => FilterType::Nearest,
            ResizeMethod::Bilinear => FilterType::Triangle,
            ResizeMethod::Bicubic => FilterType::CatmullRom,
            ResizeMethod::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Batch-of-one NHWC tensor with values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array4<f32>,
}

impl NormalizedTensor {
    pub fn from_array(data: Array4<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> [usize; 4] {
        let dims = self.data.dim();
        [dims.0, dims.1, dims.2, dims.3]
    }

    pub fn array(&self) -> &Array4<f32> {
        &self.data
    }

    /// Elements in row-major (N, H, W, C) order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Decodes the image at `path`, resizes it to `target_size` (height, width)
/// and scales every channel value from `[0, 255]` into `[0, 1]`.
pub fn normalize(
    path: &Path,
    target_size: (u32, u32),
    method: ResizeMethod,
) -> Result<NormalizedTensor, DecodeError> {
    let read_err = |source| DecodeError::Read {
        path: path.to_path_buf(),
        source,
    };
    let image = ImageReader::open(path)
        .map_err(read_err)?
        .with_guessed_format()
        .map_err(read_err)?
        .decode()?;

    let (height, width) = target_size;
    let rgb = image
        .resize_exact(width, height, method.into())
        .to_rgb8();

    let data = Array4::from_shape_fn(
        (1, height as usize, width as usize, CHANNELS),
        |(_, y, x, c)| f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0,
    );
    Ok(NormalizedTensor { data })
}
