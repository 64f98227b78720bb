//! Static, packed R-tree over feature bounding boxes.
//!
//! ## Layout
//!
//! ```text
//! [node 0: header]  extent of the whole tree, child = node size (branching factor)
//! [leaves]          one per indexed record, STR order, child = rank
//! [level 1]         child = index of first child node in the leaf level
//! ...
//! [root]            single node, last
//! ```
//!
//! Every node is `minX,minY,maxX,maxY: f64 LE` followed by `child: u32 LE`.
//! There is no leaf/internal tag: given the node count and the branching
//! factor the level sizes are fully determined, so a node's depth follows
//! from its position.
//!
//! Bulk loading is sort-tile-recursive: at each level the entries are sorted
//! by center x, cut into vertical slices of `ceil(sqrt(pages))` pages, each
//! slice sorted by center y, and consecutive runs of `node_size` entries
//! become one parent.

use super::{read_f64, read_u32, IndexSlice};
use crate::error::{GeofileError, Result};
use crate::types::{BBox, Rank};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::ops::Range;
use tracing::debug;

/// Bytes per node record.
pub const RTREE_RECORD_SIZE: usize = 36;

#[derive(Debug, Clone, Copy)]
struct Node {
    bbox: BBox,
    child: u32,
}

impl Node {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.bbox.min_x.to_le_bytes());
        out.extend_from_slice(&self.bbox.min_y.to_le_bytes());
        out.extend_from_slice(&self.bbox.max_x.to_le_bytes());
        out.extend_from_slice(&self.bbox.max_y.to_le_bytes());
        out.extend_from_slice(&self.child.to_le_bytes());
    }

    fn read(bytes: &[u8]) -> Self {
        Node {
            bbox: BBox::new(
                read_f64(bytes, 0),
                read_f64(bytes, 8),
                read_f64(bytes, 16),
                read_f64(bytes, 24),
            ),
            child: read_u32(bytes, 32),
        }
    }
}

/// Sizes of each level, leaves first, for `leaves` entries.
fn level_sizes(leaves: usize, node_size: usize) -> Vec<usize> {
    if leaves == 0 {
        return Vec::new();
    }
    let mut sizes = vec![leaves];
    let mut n = leaves;
    while n > 1 {
        n = n.div_ceil(node_size);
        sizes.push(n);
    }
    sizes
}

/// Leaf count whose tree has exactly `total` nodes, if any.
fn leaves_for_total(total: usize, node_size: usize) -> Option<usize> {
    let nodes = |n: usize| level_sizes(n, node_size).iter().sum::<usize>();
    let (mut lo, mut hi) = (0usize, total);
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        match nodes(mid).cmp(&total) {
            Ordering::Equal => return Some(mid),
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => {
                if mid == 0 {
                    return None;
                }
                hi = mid - 1;
            }
        }
    }
    None
}

fn by_center_x(a: &Node, b: &Node) -> Ordering {
    let (ax, ay) = a.bbox.center();
    let (bx, by) = b.bbox.center();
    ax.total_cmp(&bx)
        .then(ay.total_cmp(&by))
        .then(a.child.cmp(&b.child))
}

fn by_center_y(a: &Node, b: &Node) -> Ordering {
    let (ax, ay) = a.bbox.center();
    let (bx, by) = b.bbox.center();
    ay.total_cmp(&by)
        .then(ax.total_cmp(&bx))
        .then(a.child.cmp(&b.child))
}

fn str_sort(nodes: &mut [Node], node_size: usize) {
    nodes.par_sort_unstable_by(by_center_x);
    let pages = nodes.len().div_ceil(node_size);
    let slices = (pages as f64).sqrt().ceil().max(1.0) as usize;
    let slice_len = slices * node_size;
    nodes
        .par_chunks_mut(slice_len)
        .for_each(|slice| slice.sort_unstable_by(by_center_y));
}

/// Read-only packed R-tree.
#[derive(Debug, Clone)]
pub struct RtreeIndex {
    slice: IndexSlice,
    node_size: usize,
    leaf_count: u32,
    levels: Vec<Range<usize>>,
    extent: BBox,
}

impl RtreeIndex {
    /// Bulk-load a tree from `(rank, bbox)` entries.
    ///
    /// Entries with invalid boxes (non-finite or inverted) are left out.
    pub fn build(entries: Vec<(Rank, BBox)>, node_size: usize) -> Result<Vec<u8>> {
        if node_size < 2 {
            return Err(GeofileError::Config {
                reason: format!("rtree node size must be at least 2, got {}", node_size),
            });
        }

        let mut current: Vec<Node> = entries
            .into_iter()
            .filter(|(_, bbox)| bbox.is_valid())
            .map(|(rank, bbox)| Node { bbox, child: rank })
            .collect();
        let leaf_count = current.len();

        let mut levels: Vec<Vec<Node>> = Vec::new();
        let mut offset = 0usize;
        while !current.is_empty() {
            str_sort(&mut current, node_size);
            if current.len() == 1 {
                levels.push(current);
                break;
            }
            let parents: Vec<Node> = current
                .chunks(node_size)
                .enumerate()
                .map(|(j, chunk)| {
                    let mut bbox = BBox::empty();
                    for node in chunk {
                        bbox.expand(&node.bbox);
                    }
                    Node {
                        bbox,
                        child: (offset + j * node_size) as u32,
                    }
                })
                .collect();
            offset += current.len();
            levels.push(current);
            current = parents;
        }

        let extent = levels
            .last()
            .and_then(|root| root.first())
            .map(|root| root.bbox)
            .unwrap_or_else(BBox::empty);
        let total: usize = levels.iter().map(Vec::len).sum();

        let mut out = Vec::with_capacity((total + 1) * RTREE_RECORD_SIZE);
        Node {
            bbox: extent,
            child: node_size as u32,
        }
        .write(&mut out);
        for level in &levels {
            for node in level {
                node.write(&mut out);
            }
        }

        debug!(leaves = leaf_count, nodes = total, depth = levels.len(), "Packed rtree");
        Ok(out)
    }

    pub fn from_slice(slice: IndexSlice) -> Result<Self> {
        if slice.len() % RTREE_RECORD_SIZE != 0 || slice.is_empty() {
            return Err(GeofileError::format(format!(
                "rtree length {} is not a positive multiple of {}",
                slice.len(),
                RTREE_RECORD_SIZE
            )));
        }
        let header = Node::read(&slice.as_bytes()[..RTREE_RECORD_SIZE]);
        let node_size = header.child as usize;
        if node_size < 2 {
            return Err(GeofileError::format(format!("rtree node size {} is invalid", node_size)));
        }

        let total = slice.len() / RTREE_RECORD_SIZE - 1;
        let leaf_count = leaves_for_total(total, node_size).ok_or_else(|| {
            GeofileError::format(format!(
                "rtree node count {} does not match node size {}",
                total, node_size
            ))
        })?;

        let mut levels = Vec::new();
        let mut start = 0usize;
        for size in level_sizes(leaf_count, node_size) {
            levels.push(start..start + size);
            start += size;
        }

        let index = RtreeIndex {
            slice,
            node_size,
            leaf_count: leaf_count as u32,
            levels,
            extent: header.bbox,
        };
        index.check_children()?;
        Ok(index)
    }

    fn check_children(&self) -> Result<()> {
        for pair in self.levels.windows(2) {
            let (below, level) = (&pair[0], &pair[1]);
            for i in level.clone() {
                let child = self.node(i).child as usize;
                if !below.contains(&child) {
                    return Err(GeofileError::format(format!(
                        "rtree node {} points outside its child level",
                        i
                    )));
                }
            }
        }
        Ok(())
    }

    fn node(&self, i: usize) -> Node {
        let at = (i + 1) * RTREE_RECORD_SIZE;
        Node::read(&self.slice.as_bytes()[at..at + RTREE_RECORD_SIZE])
    }

    /// Number of indexed records.
    pub fn leaf_count(&self) -> u32 {
        self.leaf_count
    }

    /// Branching factor the tree was packed with.
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Number of levels, leaves included.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Union of all indexed boxes.
    pub fn extent(&self) -> BBox {
        self.extent
    }

    pub fn byte_len(&self) -> usize {
        self.slice.len()
    }

    /// Ranks of all leaves, in storage order.
    pub fn leaf_ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.levels
            .first()
            .cloned()
            .unwrap_or(0..0)
            .map(move |i| self.node(i).child)
    }

    /// Ranks of every leaf whose box intersects `query`.
    ///
    /// Order is depth-first, left to right: deterministic for a given tree
    /// and query, but not sorted.
    pub fn search(&self, query: &BBox) -> Vec<Rank> {
        let mut out = Vec::new();
        let Some(top) = self.levels.len().checked_sub(1) else {
            return out;
        };

        let mut stack = vec![(self.levels[top].start, top)];
        while let Some((i, level)) = stack.pop() {
            let node = self.node(i);
            if !node.bbox.intersects(query) {
                continue;
            }
            if level == 0 {
                out.push(node.child);
                continue;
            }
            let below = &self.levels[level - 1];
            let first = node.child as usize;
            let last = (first + self.node_size).min(below.end);
            for child in (first..last).rev() {
                stack.push((child, level - 1));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn load(entries: Vec<(Rank, BBox)>, node_size: usize) -> RtreeIndex {
        let buf: Arc<[u8]> = RtreeIndex::build(entries, node_size).unwrap().into();
        RtreeIndex::from_slice(IndexSlice::whole(buf)).unwrap()
    }

    /// Deterministic pseudo-random points in [-180, 180] x [-90, 90].
    fn scattered(n: u32) -> Vec<(Rank, BBox)> {
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 1_000_000) as f64 / 1_000_000.0
        };
        (0..n)
            .map(|rank| {
                let x = next() * 360.0 - 180.0;
                let y = next() * 180.0 - 90.0;
                if rank % 5 == 0 {
                    (rank, BBox::new(x, y, x + 2.0, y + 1.0))
                } else {
                    (rank, BBox::from_point(x, y))
                }
            })
            .collect()
    }

    fn brute_force(entries: &[(Rank, BBox)], query: &BBox) -> BTreeSet<Rank> {
        entries
            .iter()
            .filter(|(_, b)| b.intersects(query))
            .map(|(r, _)| *r)
            .collect()
    }

    #[test]
    fn test_level_sizes() {
        assert_eq!(level_sizes(0, 4), Vec::<usize>::new());
        assert_eq!(level_sizes(1, 4), vec![1]);
        assert_eq!(level_sizes(17, 4), vec![17, 5, 2, 1]);
        for n in 0..200 {
            let total = level_sizes(n, 3).iter().sum();
            assert_eq!(leaves_for_total(total, 3), Some(n));
        }
        // with node size 16, one leaf is one node and two leaves need three
        assert_eq!(leaves_for_total(2, 16), None);
    }

    #[test]
    fn test_search_matches_brute_force() {
        let entries = scattered(1000);
        for node_size in [2, 4, 16] {
            let tree = load(entries.clone(), node_size);
            assert_eq!(tree.leaf_count(), 1000);

            for query in [
                BBox::new(-10.0, -10.0, 10.0, 10.0),
                BBox::new(-180.0, -90.0, 0.0, 0.0),
                BBox::new(100.0, 50.0, 101.0, 50.5),
                BBox::new(-200.0, -100.0, 200.0, 100.0),
            ] {
                let found: Vec<Rank> = tree.search(&query);
                let unique: BTreeSet<Rank> = found.iter().copied().collect();
                assert_eq!(unique.len(), found.len(), "no duplicates");
                assert_eq!(unique, brute_force(&entries, &query));
            }
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let entries = scattered(300);
        let a = load(entries.clone(), 8);
        let b = load(entries, 8);
        let query = BBox::new(-90.0, -45.0, 90.0, 45.0);
        assert_eq!(a.search(&query), b.search(&query));
        assert_eq!(a.search(&query), a.search(&query));
    }

    #[test]
    fn test_point_on_boundary_is_found() {
        let tree = load(
            vec![
                (0, BBox::from_point(-100.0, -100.0)),
                (1, BBox::from_point(100.0, 100.0)),
                (2, BBox::from_point(100.0, -100.0)),
            ],
            16,
        );
        let mut below: Vec<Rank> = tree.search(&BBox::new(-200.0, -200.0, 200.0, 0.0));
        below.sort_unstable();
        assert_eq!(below, vec![0, 2]);
        assert_eq!(tree.search(&BBox::from_point(100.0, 100.0)), vec![1]);
        assert_eq!(tree.extent(), BBox::new(-100.0, -100.0, 100.0, 100.0));
    }

    #[test]
    fn test_invalid_boxes_are_excluded() {
        let tree = load(
            vec![
                (0, BBox::from_point(1.0, 1.0)),
                (1, BBox::empty()),
                (2, BBox::new(f64::NAN, 0.0, 1.0, 1.0)),
                (3, BBox::from_point(2.0, 2.0)),
            ],
            4,
        );
        assert_eq!(tree.leaf_count(), 2);
        let mut ranks: Vec<Rank> = tree.leaf_ranks().collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![0, 3]);
    }

    #[test]
    fn test_empty_and_single_leaf() {
        let empty = load(Vec::new(), 16);
        assert_eq!(empty.leaf_count(), 0);
        assert!(empty.search(&BBox::new(-1.0, -1.0, 1.0, 1.0)).is_empty());

        let single = load(vec![(7, BBox::from_point(3.0, 4.0))], 16);
        assert_eq!(single.depth(), 1);
        assert_eq!(single.search(&BBox::around(3.0, 4.0, 0.1)), vec![7]);
        assert!(single.search(&BBox::around(0.0, 0.0, 0.1)).is_empty());
    }

    #[test]
    fn test_rejects_bad_layouts() {
        assert!(RtreeIndex::build(Vec::new(), 1).is_err());

        let buf: Arc<[u8]> = vec![0u8; 35].into();
        assert!(RtreeIndex::from_slice(IndexSlice::whole(buf)).is_err());

        // node size 16 admits no tree of 2 nodes
        let mut bytes = RtreeIndex::build(scattered(1), 16).unwrap();
        bytes.extend_from_slice(&[0u8; RTREE_RECORD_SIZE]);
        let buf: Arc<[u8]> = bytes.into();
        assert!(RtreeIndex::from_slice(IndexSlice::whole(buf)).is_err());

        // root (node 3 of 3 leaves + 1) pointing past the leaf level
        let mut bytes = RtreeIndex::build(scattered(3), 16).unwrap();
        let at = 4 * RTREE_RECORD_SIZE + 32;
        bytes[at..at + 4].copy_from_slice(&99u32.to_le_bytes());
        let buf: Arc<[u8]> = bytes.into();
        assert!(RtreeIndex::from_slice(IndexSlice::whole(buf)).is_err());
    }
}
