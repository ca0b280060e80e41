//! Property tests for the storage primitives.

use proptest::prelude::*;

use mnemo_core::memory::{EmbeddingStatus, ImportanceTier};
use mnemo_storage::queries::vector_ops::{bytes_to_f32s, f32s_to_bytes};

proptest! {
    /// The byte codec is a bijection for finite vectors.
    #[test]
    fn vector_codec_roundtrips(values in proptest::collection::vec(-1000.0f32..1000.0, 0..64)) {
        let bytes = f32s_to_bytes(&values);
        prop_assert_eq!(bytes.len(), values.len() * 4);
        let decoded = bytes_to_f32s(&bytes, values.len()).unwrap();
        prop_assert_eq!(decoded, values);
    }

    /// Any blob whose length is not 4 x dimension is rejected.
    #[test]
    fn vector_codec_rejects_mismatched_lengths(
        bytes in proptest::collection::vec(any::<u8>(), 0..256),
        dim in 0usize..64,
    ) {
        let result = bytes_to_f32s(&bytes, dim);
        if bytes.len() == dim * 4 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }

    /// Column parsing is total: arbitrary strings fall back to defaults
    /// instead of failing the read path.
    #[test]
    fn enum_parsing_is_total(value in ".*") {
        let _ = ImportanceTier::parse_lossy(&value);
        let _ = EmbeddingStatus::parse_lossy(&value);
    }
}
