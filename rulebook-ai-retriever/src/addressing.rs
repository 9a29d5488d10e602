//! Content identity for documents and chunks.
//!
//! A document revision is identified by the SHA-256 of its bytes. A chunk is
//! identified by a numeric point id derived only from `(doc_id, chunk_index)`,
//! so re-ingesting a document overwrites its points instead of duplicating
//! them.
//!
//! ## Point id layout
//!
//! ```text
//!  63        48 47                      16 15             0
//! +------------+--------------------------+----------------+
//! |   zero     |  FNV-1a 32 of doc_id     |  chunk_index   |
//! +------------+--------------------------+----------------+
//! ```
//!
//! The hash runs over the UTF-16 code units of `doc_id`, which keeps ids
//! identical to those written by earlier JavaScript ingestion tooling. Ids stay
//! below 2^48, inside every client's safe integer range. Chunk indices are
//! masked to 16 bits, so a document must have at most 65 536 chunks.

use sha2::{Digest, Sha256};

/// Highest chunk index that still yields a distinct point id.
pub const MAX_CHUNK_INDEX: usize = 0xFFFF;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// `sha256:<hex digest>` of the document bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// 32-bit FNV-1a over the UTF-16 code units of `doc_id`.
pub fn doc_hash32(doc_id: &str) -> u32 {
    doc_id.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// Deterministic point id for chunk `chunk_index` of `doc_id`.
pub fn point_id(doc_id: &str, chunk_index: usize) -> u64 {
    (u64::from(doc_hash32(doc_id)) << 16) | (chunk_index & MAX_CHUNK_INDEX) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        assert_eq!(
            fingerprint(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            fingerprint(b"abc"),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(doc_hash32(""), 0x811c_9dc5);
        assert_eq!(doc_hash32("a"), 0xe40c_292c);
        assert_eq!(doc_hash32("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_point_id_is_pure_and_packs_chunk_index() {
        let doc = "ROPTA-2025-02.pdf";
        assert_eq!(point_id(doc, 3), point_id(doc, 3));
        assert_eq!(point_id(doc, 3) >> 16, u64::from(doc_hash32(doc)));
        assert_eq!(point_id(doc, 3) & 0xFFFF, 3);
        assert!(point_id(doc, MAX_CHUNK_INDEX) < 1 << 48);
    }

    #[test]
    fn test_point_ids_distinct_within_document() {
        let doc = "reglement-et-legislation-poker.pdf";
        let ids: std::collections::HashSet<u64> =
            (0..=MAX_CHUNK_INDEX).map(|i| point_id(doc, i)).collect();
        assert_eq!(ids.len(), MAX_CHUNK_INDEX + 1);
    }

    #[test]
    fn test_point_ids_differ_across_documents() {
        assert_ne!(point_id("TDA-2024.pdf", 0), point_id("TDA-2025.pdf", 0));
    }

    #[test]
    fn test_hash_uses_utf16_units() {
        // Characters outside the BMP contribute two code units.
        let manual = [0xD83C_u32, 0xDCA1]
            .iter()
            .fold(FNV_OFFSET_BASIS, |h, &u| (h ^ u).wrapping_mul(FNV_PRIME));
        assert_eq!(doc_hash32("\u{1F0A1}"), manual);
    }
}
