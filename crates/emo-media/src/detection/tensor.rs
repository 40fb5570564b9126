//! Raw detector output.

use ndarray::Array2;

use crate::error::{MediaError, MediaResult};

/// Channel-major detector output, logically `[channels, proposals]`.
#[derive(Debug, Clone)]
pub struct RawOutputTensor {
    data: Array2<f32>,
}

impl RawOutputTensor {
    /// Wrap a flat buffer using the runtime's declared shape.
    ///
    /// Accepts `[channels, proposals]` or the batched `[1, channels, proposals]`.
    pub fn from_shape(shape: &[usize], data: Vec<f32>) -> MediaResult<Self> {
        let (channels, proposals) = match shape {
            [c, n] => (*c, *n),
            [1, c, n] => (*c, *n),
            other => {
                return Err(MediaError::shape_mismatch(format!(
                    "expected [channels, proposals] output, got {:?}",
                    other
                )))
            }
        };

        let data = Array2::from_shape_vec((channels, proposals), data).map_err(|e| {
            MediaError::shape_mismatch(format!(
                "buffer does not fit {}x{}: {}",
                channels, proposals, e
            ))
        })?;

        Ok(Self { data })
    }

    /// Build from per-channel rows, all of equal length.
    pub fn from_channels(rows: &[Vec<f32>]) -> MediaResult<Self> {
        let proposals = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != proposals) {
            return Err(MediaError::shape_mismatch("channel rows differ in length"));
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Self::from_shape(&[rows.len(), proposals], flat)
    }

    pub fn channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn proposals(&self) -> usize {
        self.data.ncols()
    }

    /// Value of `channel` for proposal `index`.
    #[inline]
    pub fn value(&self, channel: usize, index: usize) -> f32 {
        self.data[[channel, index]]
    }
}
