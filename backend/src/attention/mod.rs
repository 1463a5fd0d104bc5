//! Synthetic saliency: the numeric attention grid and the visual heatmap overlay.

mod overlay;
mod synthesizer;

pub use overlay::{EncodedImage, OVERLAY_JPEG_QUALITY, generate_heatmap_overlay, overlay_from_upload};
pub use synthesizer::{ATTENTION_GRID, AttentionMap, FocalPoint, focal_points, synthesize_attention};
