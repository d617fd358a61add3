//! Borrowed tensor views

use half::{bf16, f16};
use shardmap_common::{DType, Result, ShardMapError};
use std::fmt;

/// A tensor's bytes inside a mapped region, with its dtype and shape.
///
/// Borrows the owning index; no bytes are copied.
#[derive(Clone, Copy)]
pub struct WeightView<'a> {
    name: &'a str,
    dtype: DType,
    shape: &'a [u64],
    data: &'a [u8],
}

impl<'a> WeightView<'a> {
    pub fn new(name: &'a str, dtype: DType, shape: &'a [u64], data: &'a [u8]) -> Self {
        Self { name, dtype, shape, data }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &'a [u64] {
        self.shape
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn numel(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Reinterpret the bytes as `T` without copying.
    ///
    /// Fails when the data is misaligned for `T` or its length is not a
    /// multiple of `size_of::<T>()`.
    pub fn cast_slice<T: bytemuck::Pod>(&self) -> Result<&'a [T]> {
        bytemuck::try_cast_slice(self.data).map_err(|e| self.conversion(format!("{e:?}")))
    }

    /// Decode floating point data into an owned `Vec<f32>`.
    ///
    /// Every [`DType::is_float`] type is supported (F64 is narrowed). The
    /// bytes are little-endian and may sit at any alignment.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match self.dtype {
            DType::F32 => Ok(self.le_chunks::<4>()?.map(f32::from_le_bytes).collect()),
            DType::F64 => {
                Ok(self.le_chunks::<8>()?.map(|c| f64::from_le_bytes(c) as f32).collect())
            }
            DType::F16 => Ok(self
                .le_chunks::<2>()?
                .map(|c| f16::from_bits(u16::from_le_bytes(c)).to_f32())
                .collect()),
            DType::BF16 => Ok(self
                .le_chunks::<2>()?
                .map(|c| bf16::from_bits(u16::from_le_bytes(c)).to_f32())
                .collect()),
            other => Err(self.conversion(format!("{other} cannot be read as f32"))),
        }
    }

    /// Fixed-width element chunks, copied out so alignment does not matter.
    fn le_chunks<const N: usize>(&self) -> Result<impl Iterator<Item = [u8; N]>> {
        self.check_len(N)?;
        Ok(self.data.chunks_exact(N).filter_map(|c| <[u8; N]>::try_from(c).ok()))
    }

    fn check_len(&self, width: usize) -> Result<()> {
        if self.data.len() % width != 0 {
            return Err(self.conversion(format!(
                "{} bytes is not a multiple of the {width}-byte {} element",
                self.data.len(),
                self.dtype
            )));
        }
        Ok(())
    }

    fn conversion(&self, reason: String) -> ShardMapError {
        ShardMapError::Conversion { name: self.name.to_string(), reason }
    }
}

impl fmt::Debug for WeightView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightView")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("bytes", &self.data.len())
            .finish()
    }
}
