//! Shared node page layout.
//!
//! Every tree node (internal or leaf) starts with the same 32-byte
//! header:
//!
//! ```text
//! offset  0: kind        u8   (1 = internal, 2 = leaf)
//! offset  2: size        u16  (number of entries)
//! offset  4: max_size    u16  (configured fan-out)
//! offset  8: page_id     u64  (the node's own page)
//! offset 16: parent      u64  (u64::MAX = none; none <=> root)
//! offset 24: next        u64  (leaf only: right sibling, u64::MAX = none)
//! offset 32: entry array
//! ```
//!
//! All fields are little-endian. Page references encode "absent" as
//! `u64::MAX`.

use crate::index::error::IndexError;
use crate::storage::PageId;

pub(crate) const NODE_HEADER_SIZE: usize = 32;

const OFF_KIND: usize = 0;
const OFF_SIZE: usize = 2;
const OFF_MAX_SIZE: usize = 4;
const OFF_PAGE_ID: usize = 8;
const OFF_PARENT: usize = 16;
const OFF_NEXT: usize = 24;

/// Absent page reference in on-disk encodings.
const NO_PAGE: u64 = u64::MAX;

/// Node page type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Internal = 1,
    Leaf = 2,
}

/// Reads and validates the node kind tag.
pub(crate) fn node_kind(data: &[u8]) -> Result<NodeKind, IndexError> {
    match data[OFF_KIND] {
        1 => Ok(NodeKind::Internal),
        2 => Ok(NodeKind::Leaf),
        other => Err(IndexError::Corrupted(format!(
            "unknown node kind tag {}",
            other
        ))),
    }
}

pub(crate) fn set_kind(data: &mut [u8], kind: NodeKind) {
    data[OFF_KIND] = kind as u8;
}

pub(crate) fn size(data: &[u8]) -> usize {
    read_u16(data, OFF_SIZE) as usize
}

pub(crate) fn set_size(data: &mut [u8], size: usize) {
    write_u16(data, OFF_SIZE, size as u16);
}

pub(crate) fn max_size(data: &[u8]) -> usize {
    read_u16(data, OFF_MAX_SIZE) as usize
}

pub(crate) fn set_max_size(data: &mut [u8], max_size: usize) {
    write_u16(data, OFF_MAX_SIZE, max_size as u16);
}

pub(crate) fn page_id(data: &[u8]) -> PageId {
    PageId::new(read_u64(data, OFF_PAGE_ID))
}

pub(crate) fn set_page_id(data: &mut [u8], page_id: PageId) {
    write_u64(data, OFF_PAGE_ID, page_id.page_num());
}

pub(crate) fn parent(data: &[u8]) -> Option<PageId> {
    decode_page_ref(read_u64(data, OFF_PARENT))
}

pub(crate) fn set_parent(data: &mut [u8], parent: Option<PageId>) {
    write_u64(data, OFF_PARENT, encode_page_ref(parent));
}

pub(crate) fn next_leaf(data: &[u8]) -> Option<PageId> {
    decode_page_ref(read_u64(data, OFF_NEXT))
}

pub(crate) fn set_next_leaf(data: &mut [u8], next: Option<PageId>) {
    write_u64(data, OFF_NEXT, encode_page_ref(next));
}

/// True iff the node is the root (no parent back-reference).
pub(crate) fn is_root(data: &[u8]) -> bool {
    parent(data).is_none()
}

/// Minimum fill for a non-root node of the given kind and fan-out.
pub(crate) fn min_size(kind: NodeKind, max_size: usize) -> usize {
    match kind {
        // ceil(max / 2) children
        NodeKind::Internal => max_size.div_ceil(2),
        // ceil((max - 1) / 2) records
        NodeKind::Leaf => max_size / 2,
    }
}

pub(crate) fn encode_page_ref(page: Option<PageId>) -> u64 {
    match page {
        Some(id) => id.page_num(),
        None => NO_PAGE,
    }
}

pub(crate) fn decode_page_ref(raw: u64) -> Option<PageId> {
    if raw == NO_PAGE {
        None
    } else {
        Some(PageId::new(raw))
    }
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().expect("8-byte slice"))
}

pub(crate) fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_i64(data: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(data[offset..offset + 8].try_into().expect("8-byte slice"))
}

pub(crate) fn write_i64(data: &mut [u8], offset: usize, value: i64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PAGE_SIZE;

    #[test]
    fn test_header_round_trip() {
        let mut buf = vec![0u8; PAGE_SIZE];
        set_kind(&mut buf, NodeKind::Leaf);
        set_size(&mut buf, 3);
        set_max_size(&mut buf, 64);
        set_page_id(&mut buf, PageId::new(9));
        set_parent(&mut buf, Some(PageId::new(4)));
        set_next_leaf(&mut buf, None);

        assert_eq!(node_kind(&buf).unwrap(), NodeKind::Leaf);
        assert_eq!(size(&buf), 3);
        assert_eq!(max_size(&buf), 64);
        assert_eq!(page_id(&buf), PageId::new(9));
        assert_eq!(parent(&buf), Some(PageId::new(4)));
        assert_eq!(next_leaf(&buf), None);
        assert!(!is_root(&buf));
    }

    #[test]
    fn test_unknown_kind_is_corrupted() {
        let buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(node_kind(&buf), Err(IndexError::Corrupted(_))));
    }

    #[test]
    fn test_min_size() {
        assert_eq!(min_size(NodeKind::Internal, 3), 2);
        assert_eq!(min_size(NodeKind::Internal, 4), 2);
        assert_eq!(min_size(NodeKind::Internal, 5), 3);
        assert_eq!(min_size(NodeKind::Leaf, 3), 1);
        assert_eq!(min_size(NodeKind::Leaf, 4), 2);
        assert_eq!(min_size(NodeKind::Leaf, 5), 2);
    }

    #[test]
    fn test_page_ref_encoding() {
        assert_eq!(decode_page_ref(encode_page_ref(None)), None);
        assert_eq!(
            decode_page_ref(encode_page_ref(Some(PageId::new(12)))),
            Some(PageId::new(12))
        );
    }
}
