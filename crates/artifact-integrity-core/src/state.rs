//! Structured state: named collections of multidimensional numeric arrays.
//!
//! Callers adapt their native model representation to [`StructuredState`]
//! once, at the boundary. [`StateDict`] is the owned implementation used
//! when the tensors are already in memory.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    UInt8,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    BFloat16,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl DType {
    const ALL: [DType; 12] = [
        DType::Bool,
        DType::UInt8,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::Float16,
        DType::BFloat16,
        DType::Float32,
        DType::Float64,
        DType::Complex64,
        DType::Complex128,
    ];

    /// Short name (`float32`).
    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::UInt8 => "uint8",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float16 => "float16",
            DType::BFloat16 => "bfloat16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        }
    }

    /// Identifier fed into the canonical hash.
    ///
    /// Matches the PyTorch dtype repr so fingerprints agree with state dicts
    /// hashed by the existing model tooling.
    pub fn identifier(&self) -> String {
        format!("torch.{}", self.name())
    }

    /// Bytes per element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::Bool | DType::UInt8 | DType::Int8 => 1,
            DType::Int16 | DType::Float16 | DType::BFloat16 => 2,
            DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    /// Width of the unit that gets byte-swapped.
    ///
    /// Complex numbers swap their real and imaginary parts independently.
    pub fn swap_width(&self) -> usize {
        match self {
            DType::Complex64 => 4,
            DType::Complex128 => 8,
            other => other.element_size(),
        }
    }

    /// Parse `float32` or `torch.float32`.
    pub fn parse(s: &str) -> Result<Self> {
        let bare = s.trim().strip_prefix("torch.").unwrap_or(s.trim());
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name() == bare)
            .ok_or_else(|| CoreError::UnknownIdentifier(s.to_string()))
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Byte order of raw element data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Borrowed view of one tensor.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub shape: &'a [usize],
    pub dtype: DType,
    pub byte_order: ByteOrder,
    pub data: &'a [u8],
}

impl TensorView<'_> {
    /// Number of elements implied by the shape.
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Shape as comma-joined decimal integers (`2,3`; empty for a scalar).
    pub fn shape_string(&self) -> String {
        self.shape
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Value stored under one key.
#[derive(Debug, Clone)]
pub enum EntryValue<'a> {
    Tensor(TensorView<'a>),
    /// Anything that is not a tensor; the string describes what it is.
    Unsupported(Cow<'a, str>),
}

/// A mapping from unique names to tensors.
pub trait StructuredState {
    /// Every entry, in any order.
    fn entries(&self) -> Vec<(&str, EntryValue<'_>)>;
}

/// Owned tensor with raw element bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub byte_order: ByteOrder,
    pub data: Vec<u8>,
}

macro_rules! le_constructor {
    ($name:ident, $ty:ty, $dtype:expr) => {
        #[doc = concat!("Tensor of `", stringify!($ty), "` values, stored little-endian.")]
        pub fn $name(shape: Vec<usize>, values: &[$ty]) -> Self {
            let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            Self::new(shape, $dtype, ByteOrder::Little, data)
        }
    };
}

impl Tensor {
    /// Tensor over raw element bytes in `byte_order`.
    pub fn new(shape: Vec<usize>, dtype: DType, byte_order: ByteOrder, data: Vec<u8>) -> Self {
        Self {
            shape,
            dtype,
            byte_order,
            data,
        }
    }

    le_constructor!(from_f32, f32, DType::Float32);
    le_constructor!(from_f64, f64, DType::Float64);
    le_constructor!(from_i16, i16, DType::Int16);
    le_constructor!(from_i32, i32, DType::Int32);
    le_constructor!(from_i64, i64, DType::Int64);

    /// Tensor of bytes.
    pub fn from_u8(shape: Vec<usize>, values: &[u8]) -> Self {
        Self::new(shape, DType::UInt8, ByteOrder::Little, values.to_vec())
    }

    /// Tensor of booleans (one byte each, 0 or 1).
    pub fn from_bool(shape: Vec<usize>, values: &[bool]) -> Self {
        let data = values.iter().map(|&b| u8::from(b)).collect();
        Self::new(shape, DType::Bool, ByteOrder::Little, data)
    }

    /// Same values with every element byte-swapped into the other order.
    pub fn to_byte_order(&self, order: ByteOrder) -> Self {
        if order == self.byte_order {
            return self.clone();
        }
        let mut data = self.data.clone();
        swap_in_place(&mut data, self.dtype.swap_width());
        Self::new(self.shape.clone(), self.dtype, order, data)
    }

    /// Borrowed view handed to the canonical hasher.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            dtype: self.dtype,
            byte_order: self.byte_order,
            data: &self.data,
        }
    }
}

/// Reverse every `width`-byte unit of `data`.
pub(crate) fn swap_in_place(data: &mut [u8], width: usize) {
    if width > 1 {
        for unit in data.chunks_exact_mut(width) {
            unit.reverse();
        }
    }
}

/// Value held by a [`StateDict`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Tensor(Tensor),
    /// A non-tensor entry, kept so that hashing can reject it by name.
    Opaque(String),
}

/// Insertion-ordered owned structured state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    entries: Vec<(String, StateValue)>,
}

impl StateDict {
    /// Create an empty state mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tensor.
    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) -> &mut Self {
        self.put(key.into(), StateValue::Tensor(tensor))
    }

    /// Insert or replace a non-tensor entry.
    pub fn insert_opaque(
        &mut self,
        key: impl Into<String>,
        description: impl Into<String>,
    ) -> &mut Self {
        self.put(key.into(), StateValue::Opaque(description.into()))
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, tensor: Tensor) -> Self {
        self.insert(key, tensor);
        self
    }

    fn put(&mut self, key: String, value: StateValue) -> &mut Self {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<StateValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl StructuredState for StateDict {
    fn entries(&self) -> Vec<(&str, EntryValue<'_>)> {
        self.entries
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    StateValue::Tensor(t) => EntryValue::Tensor(t.view()),
                    StateValue::Opaque(desc) => {
                        EntryValue::Unsupported(Cow::Borrowed(desc.as_str()))
                    }
                };
                (k.as_str(), value)
            })
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Tensor)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (K, Tensor)>>(iter: I) -> Self {
        let mut dict = StateDict::new();
        for (k, t) in iter {
            dict.insert(k, t);
        }
        dict
    }
}

impl StructuredState for std::collections::HashMap<String, Tensor> {
    fn entries(&self) -> Vec<(&str, EntryValue<'_>)> {
        self.iter()
            .map(|(k, t)| (k.as_str(), EntryValue::Tensor(t.view())))
            .collect()
    }
}

impl StructuredState for std::collections::BTreeMap<String, Tensor> {
    fn entries(&self) -> Vec<(&str, EntryValue<'_>)> {
        self.iter()
            .map(|(k, t)| (k.as_str(), EntryValue::Tensor(t.view())))
            .collect()
    }
}
