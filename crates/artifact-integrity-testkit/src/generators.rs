//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::Value;

use artifact_integrity_core::{ByteOrder, DType, StateDict, Tensor};

/// Generate a DType.
pub fn dtype() -> impl Strategy<Value = DType> {
    prop::sample::select(vec![
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
    ])
}

/// Generate a byte order.
pub fn byte_order() -> impl Strategy<Value = ByteOrder> {
    prop_oneof![Just(ByteOrder::Little), Just(ByteOrder::Big)]
}

/// Generate a shape of up to 3 dimensions (scalars and zero dims included).
pub fn shape() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..5, 0..=3)
}

/// Generate a well-formed tensor: data length always matches shape and dtype.
pub fn tensor() -> impl Strategy<Value = Tensor> {
    (shape(), dtype(), byte_order()).prop_flat_map(|(shape, dtype, order)| {
        let len = shape.iter().product::<usize>() * dtype.element_size();
        prop::collection::vec(any::<u8>(), len)
            .prop_map(move |data| Tensor::new(shape.clone(), dtype, order, data))
    })
}

/// Generate a state key.
pub fn state_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,15}".prop_map(String::from)
}

/// Generate a state with up to `max_entries` unique keys.
pub fn state_dict(max_entries: usize) -> impl Strategy<Value = StateDict> {
    prop::collection::btree_map(state_key(), tensor(), 0..=max_entries)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Generate artifact bytes of up to `max_len`.
pub fn artifact_bytes(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate log noise that contains no JSON delimiters.
pub fn log_noise() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z0-9 :.,=!()/-]{0,60}", 0..5).prop_map(|lines| lines.join("\n"))
}

/// Wrap `payload` in log noise, the way registrar tools print it.
pub fn noisy_output(payload: Value) -> impl Strategy<Value = String> {
    (log_noise(), log_noise()).prop_map(move |(before, after)| {
        format!("{}\n{}\n{}", before, payload, after)
    })
}

/// Every state entry converted to the opposite byte order.
pub fn flip_byte_order(state: &StateDict) -> StateDict {
    state
        .keys()
        .filter_map(|key| match state.get(key) {
            Some(artifact_integrity_core::StateValue::Tensor(t)) => {
                let flipped = match t.byte_order {
                    ByteOrder::Little => ByteOrder::Big,
                    ByteOrder::Big => ByteOrder::Little,
                };
                Some((key.to_string(), t.to_byte_order(flipped)))
            }
            _ => None,
        })
        .collect()
}
