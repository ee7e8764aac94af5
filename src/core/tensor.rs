//! Dense numeric tensors
//!
//! Only storage and shape live here; the tensor is a carrier for numeric
//! data moving through archives and the cloud.

use crate::core::archive::{
    load_len, store_len, store_sequence_len, wrap_load, wrap_store, Archivable, InputArchive,
    OutputArchive, Sequence, TriviallyCodable,
};
use crate::core::error::{CloudError, Result};
use num_complex::Complex;

/// Element types a tensor can hold, each with its own tensor cookie
pub trait TensorElement: TriviallyCodable {
    const TENSOR_COOKIE: u8;
}

impl TensorElement for i32 {
    const TENSOR_COOKIE: u8 = 32;
}

impl TensorElement for i64 {
    const TENSOR_COOKIE: u8 = 33;
}

impl TensorElement for f32 {
    const TENSOR_COOKIE: u8 = 34;
}

impl TensorElement for f64 {
    const TENSOR_COOKIE: u8 = 35;
}

impl TensorElement for Complex<f32> {
    const TENSOR_COOKIE: u8 = 36;
}

impl TensorElement for Complex<f64> {
    const TENSOR_COOKIE: u8 = 37;
}

/// Row-major dense tensor
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor<T> {
    dims: Vec<usize>,
    data: Vec<T>,
}

fn element_count(dims: &[usize]) -> Option<usize> {
    if dims.is_empty() {
        return Some(0);
    }
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl<T: TensorElement> Tensor<T> {
    /// Zero-filled tensor of the given shape
    pub fn zeros(dims: &[usize]) -> Result<Self> {
        let len = element_count(dims)
            .ok_or_else(|| CloudError::InvalidValue(format!("tensor shape {:?} overflows", dims)))?;
        Ok(Tensor {
            dims: dims.to_vec(),
            data: vec![T::default(); len],
        })
    }

    /// Wrap existing row-major data; its length must match the shape
    pub fn from_vec(dims: &[usize], data: Vec<T>) -> Result<Self> {
        match element_count(dims) {
            Some(len) if len == data.len() => Ok(Tensor {
                dims: dims.to_vec(),
                data,
            }),
            Some(len) => Err(CloudError::SizeMismatch {
                expected: len,
                found: data.len(),
            }),
            None => Err(CloudError::InvalidValue(format!(
                "tensor shape {:?} overflows",
                dims
            ))),
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &d) in index.iter().zip(&self.dims) {
            if i >= d {
                return None;
            }
            offset = offset * d + i;
        }
        Some(offset)
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.offset(index).map(|o| &self.data[o])
    }

    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        self.offset(index).map(move |o| &mut self.data[o])
    }
}

impl<T> Sequence for Tensor<T> {
    fn element_count(&self) -> usize {
        self.data.len()
    }
}

/// Payload: rank, each extent as `u64`, then the data as a bulk sequence
impl<T: TensorElement> Archivable for Tensor<T> {
    const COOKIE: u8 = T::TENSOR_COOKIE;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_len(ar, self.dims.len())?;
        for &d in &self.dims {
            wrap_store(ar, &(d as u64))?;
        }
        store_sequence_len(ar, self)?;
        T::store_array(&self.data, ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let ndim = load_len(ar)?;
        let mut dims = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            let mut d = 0u64;
            wrap_load(ar, &mut d)?;
            dims.push(
                usize::try_from(d)
                    .map_err(|_| CloudError::InvalidValue(format!("tensor extent {} overflows", d)))?,
            );
        }

        let len = load_len(ar)?;
        let mut data = vec![T::default(); len];
        T::load_array(&mut data, ar)?;
        *self = Tensor::from_vec(&dims, data)?;
        Ok(())
    }
}
