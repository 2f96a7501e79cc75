//! Multi-channel frames assembled from per-channel `.npy` arrays.

use bytes::{Bytes, BytesMut};
use snafu::prelude::*;

use super::error::{DatasetError, FrameMismatchSnafu};
use crate::npy::{ElementType, NpyArray};

/// A `(channels, height, width)` stack of channel images.
///
/// Element bytes keep the dtype and byte order of the source arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    array: NpyArray,
}

impl Frame {
    /// Stack 2-D channel arrays along a new leading axis.
    ///
    /// # Errors
    ///
    /// [`DatasetError::FrameMismatch`] if `layers` is empty, any array is not
    /// 2-D, or the arrays disagree on element type or shape.
    pub fn stack(layers: &[NpyArray]) -> Result<Self, DatasetError> {
        let first = layers.first().context(FrameMismatchSnafu {
            reason: "no channel arrays to stack",
        })?;
        let element = first.element_type();
        let plane = first.shape().to_vec();

        for (i, layer) in layers.iter().enumerate() {
            ensure!(
                layer.shape().len() == 2,
                FrameMismatchSnafu {
                    reason: format!(
                        "channel {i} has {} dimensions, expected 2",
                        layer.shape().len()
                    )
                }
            );
            ensure!(
                layer.element_type() == element,
                FrameMismatchSnafu {
                    reason: format!(
                        "channel {i} has dtype {}, channel 0 has {}",
                        layer.element_type().descr(),
                        element.descr()
                    )
                }
            );
            ensure!(
                layer.shape() == plane.as_slice(),
                FrameMismatchSnafu {
                    reason: format!(
                        "channel {i} has shape {:?}, channel 0 has {:?}",
                        layer.shape(),
                        plane
                    )
                }
            );
        }

        let mut data = BytesMut::with_capacity(layers.iter().map(|l| l.data().len()).sum());
        for layer in layers {
            data.extend_from_slice(layer.data());
        }

        let shape = vec![layers.len(), plane[0], plane[1]];
        let array = NpyArray::new(element, shape, data.freeze()).map_err(|e| {
            DatasetError::FrameMismatch {
                reason: e.to_string(),
            }
        })?;
        Ok(Self { array })
    }

    /// `[channels, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        let s = self.array.shape();
        [s[0], s[1], s[2]]
    }

    /// Number of stacked channels.
    pub fn channels(&self) -> usize {
        self.shape()[0]
    }

    /// Image height.
    pub fn height(&self) -> usize {
        self.shape()[1]
    }

    /// Image width.
    pub fn width(&self) -> usize {
        self.shape()[2]
    }

    /// Common element type of all channels.
    pub fn element_type(&self) -> ElementType {
        self.array.element_type()
    }

    /// Raw element bytes, channel-major.
    pub fn data(&self) -> &Bytes {
        self.array.data()
    }

    /// Raw bytes of one channel plane.
    pub fn channel_bytes(&self, channel: usize) -> Option<Bytes> {
        if channel >= self.channels() {
            return None;
        }
        let plane = self.height() * self.width() * self.element_type().dtype.item_size();
        let start = channel * plane;
        Some(self.array.data().slice(start..start + plane))
    }

    /// Element at `(channel, y, x)` widened to `f64`.
    pub fn value_f64(&self, channel: usize, y: usize, x: usize) -> Option<f64> {
        let [c, h, w] = self.shape();
        if channel >= c || y >= h || x >= w {
            return None;
        }
        self.array.value_f64((channel * h + y) * w + x)
    }

    /// The underlying 3-D array.
    pub fn as_array(&self) -> &NpyArray {
        &self.array
    }

    /// Consume the frame, returning the 3-D array.
    pub fn into_array(self) -> NpyArray {
        self.array
    }

    /// Encode the frame as an `.npy` payload.
    pub fn to_npy_bytes(&self) -> Vec<u8> {
        self.array.to_npy_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npy::DType;

    #[test]
    fn stacks_in_layer_order() {
        let a = NpyArray::from_values(vec![2, 2], &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let b = NpyArray::from_values(vec![2, 2], &[5.0f32, 6.0, 7.0, 8.0]).unwrap();

        let frame = Frame::stack(&[a, b]).unwrap();
        assert_eq!(frame.shape(), [2, 2, 2]);
        assert_eq!(frame.element_type().dtype, DType::F32);
        assert_eq!(frame.value_f64(0, 0, 0), Some(1.0));
        assert_eq!(frame.value_f64(0, 1, 0), Some(3.0));
        assert_eq!(frame.value_f64(1, 1, 1), Some(8.0));
        assert_eq!(frame.value_f64(2, 0, 0), None);
        assert_eq!(frame.channel_bytes(1).map(|b| b.len()), Some(16));
        assert!(frame.channel_bytes(2).is_none());
    }

    #[test]
    fn mismatched_layers_are_rejected() {
        let f32_plane = NpyArray::from_values(vec![1, 2], &[1.0f32, 2.0]).unwrap();
        let f64_plane = NpyArray::from_values(vec![1, 2], &[1.0f64, 2.0]).unwrap();
        let wide = NpyArray::from_values(vec![1, 3], &[1.0f32, 2.0, 3.0]).unwrap();
        let flat = NpyArray::from_values(vec![2], &[1.0f32, 2.0]).unwrap();

        for layers in [
            vec![],
            vec![f32_plane.clone(), f64_plane],
            vec![f32_plane.clone(), wide],
            vec![flat],
        ] {
            let err = Frame::stack(&layers).unwrap_err();
            assert!(matches!(err, DatasetError::FrameMismatch { .. }), "{err}");
        }
    }

    #[test]
    fn frame_encodes_as_three_dimensional_npy() {
        let a = NpyArray::from_values(vec![1, 2], &[7u16, 9]).unwrap();
        let frame = Frame::stack(&[a.clone(), a]).unwrap();
        let decoded = NpyArray::parse(Bytes::from(frame.to_npy_bytes())).unwrap();
        assert_eq!(decoded.shape(), &[2, 1, 2]);
        assert_eq!(decoded.value_f64(3), Some(9.0));
    }
}
