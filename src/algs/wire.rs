//! Fixed, versioned, little-endian wire types for chunk migration.
//!
//! Two things cross ranks during repartitioning: fixed-size chunk metadata
//! records (gathered collectively) and whole mesh subtrees (point-to-point).
//! Metadata records are `#[repr(C)]` Pod structs with explicit field layout
//! stored pre-LE; subtrees travel as a length-prefixed header + blob. No
//! receiver may rely on host padding or byte order.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

use crate::mesh_error::MeshLoomError;
use crate::tree::Node;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kind: a serialized mesh subtree.
pub const KIND_TREE: u16 = 1;

/// Cast a Pod slice to bytes.
pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Cast bytes back to a Pod slice.
pub fn cast_slice_from<T: Pod>(v: &[u8]) -> &[T] {
    bytemuck::cast_slice(v)
}

/// Common message header.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32, // future use; keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
}

/// Per-chunk metadata exchanged during `map_chunks`.
///
/// Sender and receiver agree on this exact layout:
/// `num_elements` (u64) at offset 0, `destination_rank` (i32) at offset 8,
/// `destination_domain` (i32) at offset 12; 16 bytes total, align 8.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ChunkInfo {
    pub num_elements_le: u64,
    pub destination_rank_le: i32,
    pub destination_domain_le: i32,
}

impl ChunkInfo {
    pub const SIZE: usize = 16;

    pub fn new(num_elements: u64, destination_rank: i32, destination_domain: i32) -> Self {
        Self {
            num_elements_le: num_elements.to_le(),
            destination_rank_le: destination_rank.to_le(),
            destination_domain_le: destination_domain.to_le(),
        }
    }

    pub fn num_elements(&self) -> u64 {
        u64::from_le(self.num_elements_le)
    }
    pub fn destination_rank(&self) -> i32 {
        i32::from_le(self.destination_rank_le)
    }
    pub fn destination_domain(&self) -> i32 {
        i32::from_le(self.destination_domain_le)
    }
}

const _: () = {
    assert!(size_of::<WireHdr>() == 8);
    assert!(size_of::<ChunkInfo>() == ChunkInfo::SIZE);
    assert!(align_of::<ChunkInfo>() == 8);
};

/// Encode a mesh subtree as `[WireHdr][u64 payload-length LE][blob]`.
pub fn encode_tree(node: &Node) -> Result<Vec<u8>, MeshLoomError> {
    let blob =
        bincode::serialize(node).map_err(|e| MeshLoomError::WireFormat(e.to_string()))?;
    let hdr = WireHdr::new(KIND_TREE);
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + 8 + blob.len());
    out.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
    out.extend_from_slice(&(blob.len() as u64).to_le_bytes());
    out.extend_from_slice(&blob);
    Ok(out)
}

/// Decode a message produced by [`encode_tree`].
pub fn decode_tree(bytes: &[u8]) -> Result<Node, MeshLoomError> {
    const PREFIX: usize = size_of::<WireHdr>() + 8;
    if bytes.len() < PREFIX {
        return Err(MeshLoomError::WireFormat(format!(
            "message too short: {} bytes",
            bytes.len()
        )));
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..size_of::<WireHdr>()]);
    if hdr.version() != WIRE_VERSION {
        return Err(MeshLoomError::WireFormat(format!(
            "wire version {} (expected {})",
            hdr.version(),
            WIRE_VERSION
        )));
    }
    if hdr.kind() != KIND_TREE {
        return Err(MeshLoomError::WireFormat(format!(
            "unexpected message kind {}",
            hdr.kind()
        )));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[size_of::<WireHdr>()..PREFIX]);
    let len = u64::from_le_bytes(len_bytes) as usize;
    let blob = bytes
        .get(PREFIX..PREFIX + len)
        .ok_or_else(|| MeshLoomError::WireFormat("truncated payload".into()))?;
    bincode::deserialize(blob).map_err(|e| MeshLoomError::WireFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_eq_size;

    // If this fails, the committed struct layout is broken.
    assert_eq_size!(ChunkInfo, [u8; 16]);

    #[test]
    fn chunk_info_layout() {
        assert_eq!(size_of::<ChunkInfo>(), 16);
        let info = ChunkInfo::new(100, 1, 3);
        let bytes = cast_slice(std::slice::from_ref(&info));
        assert_eq!(&bytes[0..8], &100u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &1i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &3i32.to_le_bytes());
    }

    #[test]
    fn chunk_info_slice_roundtrip() {
        let v = vec![ChunkInfo::new(1, -1, -1), ChunkInfo::new(2, 0, 5)];
        let bytes = cast_slice(&v).to_vec();
        let back: &[ChunkInfo] = cast_slice_from(&bytes);
        assert_eq!(back[0].num_elements(), 1);
        assert_eq!(back[0].destination_rank(), -1);
        assert_eq!(back[1].destination_domain(), 5);
    }

    #[test]
    fn tree_roundtrip() {
        let mut n = Node::new();
        n.fetch_mut("topologies/mesh/elements/connectivity")
            .set(vec![0i64, 1, 2, 3]);
        n.fetch_mut("state/domain_id").set(7i64);
        let bytes = encode_tree(&n).unwrap();
        let back = decode_tree(&bytes).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn version_guard() {
        let mut bytes = encode_tree(&Node::new()).unwrap();
        bytes[0] = 0xFF;
        bytes[1] = 0xFF;
        assert!(matches!(
            decode_tree(&bytes),
            Err(MeshLoomError::WireFormat(_))
        ));
    }
}
