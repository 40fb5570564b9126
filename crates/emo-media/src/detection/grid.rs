//! Anchor grid for multi-stride detection heads.

use crate::error::{MediaError, MediaResult};

/// One anchor cell of the detection head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridProposal {
    /// Downsampling factor of the feature map this cell belongs to
    pub stride: u32,
    /// Cell column
    pub grid_x: u32,
    /// Cell row
    pub grid_y: u32,
}

/// Every proposal a detection head emits, in output-row order.
///
/// Built once per model input shape and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridTable {
    input_width: u32,
    input_height: u32,
    proposals: Vec<GridProposal>,
}

impl GridTable {
    /// Enumerate proposals for each stride in order, cells in raster order.
    pub fn build(input_width: u32, input_height: u32, strides: &[u32]) -> MediaResult<Self> {
        if strides.is_empty() {
            return Err(MediaError::invalid_config("at least one stride is required"));
        }
        if let Some(bad) = strides.iter().find(|&&s| s == 0) {
            return Err(MediaError::invalid_config(format!("invalid stride {}", bad)));
        }

        let mut proposals =
            Vec::with_capacity(Self::expected_len(input_width, input_height, strides));
        for &stride in strides {
            let cols = input_width / stride;
            let rows = input_height / stride;
            for grid_y in 0..rows {
                for grid_x in 0..cols {
                    proposals.push(GridProposal {
                        stride,
                        grid_x,
                        grid_y,
                    });
                }
            }
        }

        Ok(Self {
            input_width,
            input_height,
            proposals,
        })
    }

    /// Number of proposals a head with these strides emits.
    pub fn expected_len(input_width: u32, input_height: u32, strides: &[u32]) -> usize {
        strides
            .iter()
            .filter(|&&s| s > 0)
            .map(|&s| (input_width / s) as usize * (input_height / s) as usize)
            .sum()
    }

    pub fn input_width(&self) -> u32 {
        self.input_width
    }

    pub fn input_height(&self) -> u32 {
        self.input_height
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn proposals(&self) -> &[GridProposal] {
        &self.proposals
    }

    /// Fail unless a tensor's proposal axis matches this grid.
    pub fn check_proposals(&self, proposals: usize) -> MediaResult<()> {
        if proposals != self.proposals.len() {
            return Err(MediaError::shape_mismatch(format!(
                "tensor has {} proposals, grid for {}x{} expects {}",
                proposals,
                self.input_width,
                self.input_height,
                self.proposals.len()
            )));
        }
        Ok(())
    }
}
