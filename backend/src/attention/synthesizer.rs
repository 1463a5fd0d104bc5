use rand::Rng;
use serde::Serialize;

pub const ATTENTION_GRID: usize = 14;
pub const NOISE_AMPLITUDE: f64 = 0.05;

/// Per-region relevance on a 14×14 grid, every cell in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttentionMap {
    cells: [[f64; ATTENTION_GRID]; ATTENTION_GRID],
}

impl AttentionMap {
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    pub fn rows(&self) -> &[[f64; ATTENTION_GRID]; ATTENTION_GRID] {
        &self.cells
    }

    /// Row and column of the strongest cell.
    pub fn peak(&self) -> (usize, usize) {
        let mut best = (0, 0);
        for (i, row) in self.cells.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                if value > self.cells[best.0][best.1] {
                    best = (i, j);
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocalPoint {
    pub row: f64,
    pub col: f64,
    pub intensity: f64,
}

const fn focal(row: f64, col: f64, intensity: f64) -> FocalPoint {
    FocalPoint {
        row,
        col,
        intensity,
    }
}

const NORMAL_PATTERN: &[FocalPoint] = &[focal(7.0, 7.0, 0.3)];

/// Focal points per condition id.
const FOCAL_PATTERNS: [&[FocalPoint]; 8] = [
    NORMAL_PATTERN,
    // lesions scattered across the posterior pole
    &[focal(8.0, 6.0, 0.9), focal(5.0, 9.0, 0.7)],
    // optic disc
    &[focal(7.0, 7.0, 0.95)],
    // macula
    &[focal(7.0, 7.0, 0.8), focal(6.0, 8.0, 0.6)],
    // central lens opacity
    &[focal(7.0, 7.0, 0.7)],
    // vessel changes
    &[focal(4.0, 5.0, 0.8), focal(10.0, 9.0, 0.7)],
    &[focal(7.0, 7.0, 0.9)],
    &[focal(6.0, 8.0, 0.6), focal(8.0, 6.0, 0.5)],
];

/// Where the model is expected to look for each condition; unknown ids get the normal pattern.
pub fn focal_points(class_id: usize) -> &'static [FocalPoint] {
    FOCAL_PATTERNS.get(class_id).copied().unwrap_or(NORMAL_PATTERN)
}

/// Sums `intensity * exp(-d² / 8)` over the class's focal points, adds noise and clamps.
pub fn synthesize_attention<R: Rng + ?Sized>(class_id: usize, rng: &mut R) -> AttentionMap {
    let points = focal_points(class_id);
    let mut cells = [[0.0; ATTENTION_GRID]; ATTENTION_GRID];

    for (i, row) in cells.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let mut attention: f64 = points
                .iter()
                .map(|p| {
                    let distance_sq = (i as f64 - p.row).powi(2) + (j as f64 - p.col).powi(2);
                    p.intensity * (-distance_sq / 8.0).exp()
                })
                .sum();
            attention += rng.random::<f64>() * NOISE_AMPLITUDE;
            *cell = attention.clamp(0.0, 1.0);
        }
    }

    AttentionMap { cells }
}
