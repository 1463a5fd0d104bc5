//! Shapes decoded pixels into the model input tensor.
//!
//! Resizing is nearest-neighbour: every output coordinate samples
//! `floor(coord * source_dim / TARGET_SIZE)`, clamped to the source bounds.
//! Values are scaled to `[0, 1]` and normalized with ImageNet statistics.

use ndarray::{Array4, ArrayView4};

use crate::ingest::PixelBuffer;

pub const TARGET_SIZE: usize = 224;
pub const CHANNELS: usize = 3;
pub const IMAGENET_MEAN: [f32; CHANNELS] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; CHANNELS] = [0.229, 0.224, 0.225];

/// Model input of shape `[1, 3, 224, 224]` in NCHW order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    values: Array4<f32>,
}

impl FeatureTensor {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.values.view()
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> Option<f32> {
        self.values.get((0, channel, y, x)).copied()
    }

    /// Flat buffer, channel-major then row-major.
    pub fn to_vec(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }
}

pub fn preprocess(pixels: &PixelBuffer) -> FeatureTensor {
    let width = pixels.width() as usize;
    let height = pixels.height() as usize;
    let data = pixels.data();
    debug_assert_eq!(data.len(), width * height * 4);

    let mut values = Array4::<f32>::zeros((1, CHANNELS, TARGET_SIZE, TARGET_SIZE));
    for c in 0..CHANNELS {
        for y in 0..TARGET_SIZE {
            let src_y = (y * height / TARGET_SIZE).min(height - 1);
            for x in 0..TARGET_SIZE {
                let src_x = (x * width / TARGET_SIZE).min(width - 1);
                let byte = data[(src_y * width + src_x) * 4 + c];
                let value = byte as f32 / 255.0;
                values[[0, c, y, x]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
    }

    FeatureTensor { values }
}
