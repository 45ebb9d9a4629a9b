//! Adaptive Huffman tree
//!
//! The tree lives in a fixed array of 513 nodes with the root in the last
//! slot. Nodes in use occupy `tree_pointer..=ROOT` and are kept sorted by
//! weight, lowest first (the sibling property), so bumping a weight only ever
//! swaps a node with the highest-indexed node of its old weight. New symbols
//! enter through an escape leaf and take two slots from the bottom of the
//! array. Once the root weight reaches [`MAX_WEIGHT`] every leaf weight is
//! halved and the tree is rebuilt from scratch.

use crate::bits::BitSource;
use crate::error::{DecodeError, DecodeResult};

const NODE_COUNT: usize = 0x201;
const ROOT: usize = 0x200;
const NULL_PARENT: u16 = u16::MAX;

/// Root weight that triggers a halve-and-rebuild
pub const MAX_WEIGHT: u16 = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
    Empty,
    /// Index of the first of two adjacent children
    Internal(u16),
    Symbol(u32),
    Escape,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    weight: u16,
    parent: u16,
    child: Child,
}

impl Node {
    const EMPTY: Self = Self {
        weight: 0,
        parent: NULL_PARENT,
        child: Child::Empty,
    };

    fn is_leaf(&self) -> bool {
        matches!(self.child, Child::Symbol(_) | Child::Escape)
    }
}

/// Escape payload used when a symbol is not in the tree yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeCoding {
    /// Eight raw bits
    Byte,
    /// One gamma code
    Gamma,
}

/// Adaptive Huffman tree over byte symbols or run lengths
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    tree_pointer: usize,
    escape: EscapeCoding,
}

impl Default for HuffmanTree {
    fn default() -> Self {
        Self::new(EscapeCoding::Byte)
    }
}

impl HuffmanTree {
    /// Create an empty tree
    pub fn new(escape: EscapeCoding) -> Self {
        Self {
            nodes: vec![Node::EMPTY; NODE_COUNT],
            tree_pointer: ROOT,
            escape,
        }
    }

    /// Whether no symbol has been added yet
    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].child == Child::Empty
    }

    /// Sum of all leaf weights
    pub fn root_weight(&self) -> u16 {
        self.nodes[ROOT].weight
    }

    /// Number of leaves, escape included
    pub fn leaf_count(&self) -> usize {
        self.nodes[self.tree_pointer..ROOT]
            .iter()
            .filter(|node| node.is_leaf())
            .count()
    }

    /// Decode one symbol, reading the escape payload for unseen symbols
    pub fn decode(&mut self, source: &mut dyn BitSource) -> DecodeResult<u32> {
        if !self.is_empty() {
            if let Some(code) = self.walk(source)? {
                return Ok(code);
            }
        }
        let code = match self.escape {
            EscapeCoding::Byte => source.get_bits(8)?,
            EscapeCoding::Gamma => source.get_gamma_code()?,
        };
        self.add_new_entry(code);
        Ok(code)
    }

    fn walk(&mut self, source: &mut dyn BitSource) -> DecodeResult<Option<u32>> {
        let mut entry = ROOT;
        loop {
            match self.nodes[entry].child {
                Child::Internal(first) => {
                    entry = usize::from(first) + source.get_bit()? as usize;
                }
                Child::Symbol(code) => {
                    self.increase_count(entry);
                    return Ok(Some(code));
                }
                Child::Escape => {
                    self.increase_count(entry);
                    return Ok(None);
                }
                Child::Empty => {
                    return Err(DecodeError::Format(format!(
                        "huffman walk reached empty node {entry:#x}"
                    )));
                }
            }
        }
    }

    fn increase_count(&mut self, entry: usize) {
        self.nodes[entry].weight += 1;
        self.normalize(entry);
        if self.nodes[ROOT].weight >= MAX_WEIGHT {
            self.half_and_rebuild();
        }
    }

    fn recount(&mut self, parent: usize) {
        if let Child::Internal(first) = self.nodes[parent].child {
            let first = usize::from(first);
            self.nodes[parent].weight = self.nodes[first].weight + self.nodes[first + 1].weight;
        }
    }

    fn adopt_children(&mut self, node: usize, parent: usize) {
        if let Child::Internal(first) = self.nodes[node].child {
            let first = usize::from(first);
            self.nodes[first].parent = parent as u16;
            self.nodes[first + 1].parent = parent as u16;
        }
    }

    /// Restore weight order after the weight at `entry` grew by one
    fn normalize(&mut self, mut entry: usize) {
        while entry < ROOT {
            let weight = self.nodes[entry].weight;
            let mut swap = entry;
            while swap < ROOT - 1 && self.nodes[swap + 1].weight < weight {
                swap += 1;
            }

            if swap == entry {
                entry = usize::from(self.nodes[entry].parent);
                self.recount(entry);
                continue;
            }

            // Slots keep their parent links; contents and child links move.
            self.adopt_children(entry, swap);
            self.adopt_children(swap, entry);
            let entry_parent = self.nodes[entry].parent;
            let swap_parent = self.nodes[swap].parent;
            self.nodes.swap(entry, swap);
            self.nodes[entry].parent = entry_parent;
            self.nodes[swap].parent = swap_parent;

            entry = usize::from(swap_parent);
            self.recount(entry);
        }
    }

    /// Insert `code` as a new leaf of weight one
    pub fn add_new_entry(&mut self, code: u32) {
        if self.tree_pointer == 0 {
            // Full: the lightest symbol leaf gives up its slot.
            if let Some(slot) = self
                .nodes
                .iter_mut()
                .take(ROOT)
                .find(|node| matches!(node.child, Child::Symbol(_)))
            {
                slot.child = Child::Symbol(code);
            }
            return;
        }

        let new = self.tree_pointer - 2;
        self.tree_pointer = new;
        self.nodes[new] = Node {
            weight: 1,
            parent: NULL_PARENT,
            child: Child::Symbol(code),
        };

        if self.is_empty() {
            self.nodes[new].parent = ROOT as u16;
            self.nodes[new + 1] = Node {
                weight: 1,
                parent: ROOT as u16,
                child: Child::Escape,
            };
            self.nodes[ROOT] = Node {
                weight: 2,
                parent: NULL_PARENT,
                child: Child::Internal(new as u16),
            };
            return;
        }

        // The lightest node moves down one slot and its old slot becomes the
        // parent of it and the new leaf.
        let parent = new + 2;
        self.nodes[new + 1] = self.nodes[parent];
        self.adopt_children(new + 1, new + 1);
        self.nodes[parent] = Node {
            weight: self.nodes[new].weight + self.nodes[new + 1].weight,
            parent: self.nodes[parent].parent,
            child: Child::Internal(new as u16),
        };
        self.nodes[new].parent = parent as u16;
        self.nodes[new + 1].parent = parent as u16;
        self.normalize(parent);
    }

    fn half_and_rebuild(&mut self) {
        let mut next = ROOT;
        for index in (self.tree_pointer..ROOT).rev() {
            if self.nodes[index].is_leaf() {
                let mut leaf = self.nodes[index];
                leaf.weight = (leaf.weight + 1) >> 1;
                self.nodes[next] = leaf;
                next -= 1;
            }
        }
        next += 1;

        // `next..=ROOT` is a weight-sorted queue; merged pairs go to the bottom.
        let mut slot = self.tree_pointer;
        loop {
            self.nodes[slot] = self.nodes[next];
            self.nodes[slot + 1] = self.nodes[next + 1];
            next += 2;
            self.adopt_children(slot, slot);
            self.adopt_children(slot + 1, slot + 1);

            let merged = Node {
                weight: self.nodes[slot].weight + self.nodes[slot + 1].weight,
                parent: NULL_PARENT,
                child: Child::Internal(slot as u16),
            };
            if next > ROOT {
                self.nodes[slot].parent = ROOT as u16;
                self.nodes[slot + 1].parent = ROOT as u16;
                self.nodes[ROOT] = merged;
                break;
            }

            let mut insert = next;
            while insert <= ROOT && merged.weight > self.nodes[insert].weight {
                self.nodes[insert - 1] = self.nodes[insert];
                insert += 1;
            }
            self.nodes[insert - 1] = merged;
            next -= 1;
            slot += 2;
        }
    }

    #[cfg(test)]
    fn find_leaf(&self, wanted: Child) -> Option<usize> {
        (self.tree_pointer..ROOT).find(|&index| self.nodes[index].child == wanted)
    }

    #[cfg(test)]
    fn path_to(&self, mut entry: usize) -> Vec<u32> {
        let mut bits = Vec::new();
        while entry != ROOT {
            let parent = usize::from(self.nodes[entry].parent);
            if let Child::Internal(first) = self.nodes[parent].child {
                bits.push((entry - usize::from(first)) as u32);
            }
            entry = parent;
        }
        bits.reverse();
        bits
    }

    /// Encode `code` the way [`HuffmanTree::decode`] reads it
    #[cfg(test)]
    pub(crate) fn encode(&mut self, writer: &mut crate::bits::BitWriter, code: u32) {
        if !self.is_empty() {
            if let Some(leaf) = self.find_leaf(Child::Symbol(code)) {
                for bit in self.path_to(leaf) {
                    writer.put_bit(bit);
                }
                self.increase_count(leaf);
                return;
            }
            let escape = self
                .find_leaf(Child::Escape)
                .expect("Test operation should succeed");
            for bit in self.path_to(escape) {
                writer.put_bit(bit);
            }
            self.increase_count(escape);
        }
        match self.escape {
            EscapeCoding::Byte => writer.put_bits(code, 8),
            EscapeCoding::Gamma => writer.put_gamma(code),
        }
        self.add_new_entry(code);
    }

    /// Panic if the sibling property or the weight sums are violated
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        assert!(self.root_weight() <= MAX_WEIGHT);
        if self.is_empty() {
            return;
        }
        for index in self.tree_pointer..=ROOT {
            let node = &self.nodes[index];
            if index < ROOT {
                assert!(
                    node.weight <= self.nodes[index + 1].weight,
                    "weights out of order at {index:#x}"
                );
            }
            if let Child::Internal(first) = node.child {
                let first = usize::from(first);
                assert_eq!(
                    node.weight,
                    self.nodes[first].weight + self.nodes[first + 1].weight,
                    "weight of {index:#x} is not the sum of its children"
                );
                assert_eq!(usize::from(self.nodes[first].parent), index);
                assert_eq!(usize::from(self.nodes[first + 1].parent), index);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bits::{BitReader, BitWriter};
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn round_trip(symbols: &[u32], escape: EscapeCoding) -> HuffmanTree {
        let mut encoder = HuffmanTree::new(escape);
        let mut writer = BitWriter::new();
        for &symbol in symbols {
            encoder.encode(&mut writer, symbol);
        }
        let bytes = writer.finish();

        let mut decoder = HuffmanTree::new(escape);
        let mut reader = BitReader::new(&bytes);
        for (index, &symbol) in symbols.iter().enumerate() {
            let decoded = decoder
                .decode(&mut reader)
                .expect("Test operation should succeed");
            assert_eq!(decoded, symbol, "symbol {index}");
        }
        decoder.assert_invariants();
        decoder
    }

    #[test]
    fn test_first_symbol_is_raw() {
        let mut tree = HuffmanTree::default();
        assert!(tree.is_empty());
        let mut reader = BitReader::new(&[0x41]);
        assert_eq!(tree.decode(&mut reader).expect("Test operation should succeed"), 0x41);
        assert_eq!(tree.root_weight(), 2);
        assert_eq!(tree.leaf_count(), 2);
        tree.assert_invariants();
    }

    #[test]
    fn test_known_leaf_and_escape_paths() {
        let mut tree = HuffmanTree::default();
        tree.add_new_entry(7);
        // Leaf 7 starts at 0x1FE (bit 0); once its weight passes the escape
        // they trade slots, so the escape is then reached with bit 0 too.
        let mut writer = BitWriter::new();
        writer.put_bit(0);
        writer.put_bit(0);
        writer.put_bits(0x99, 8);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(tree.decode(&mut reader).expect("Test operation should succeed"), 7);
        assert_eq!(tree.decode(&mut reader).expect("Test operation should succeed"), 0x99);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.root_weight(), 5);
        tree.assert_invariants();
    }

    #[test]
    fn test_truncated_walk_fails() {
        let mut tree = HuffmanTree::default();
        let err = tree.decode(&mut BitReader::new(&[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
    }

    #[test]
    fn test_rebuild_keeps_tree_consistent() {
        let symbols: Vec<u32> = (0..60_000u32)
            .map(|i| if i % 5 == 0 { (i / 5) % 200 } else { i % 3 })
            .collect();
        let tree = round_trip(&symbols, EscapeCoding::Byte);
        assert!(tree.root_weight() < MAX_WEIGHT);
        assert_eq!(tree.leaf_count(), 201);
    }

    #[test]
    fn test_full_tree_replaces_lightest_symbol() {
        let mut symbols: Vec<u32> = (1..=300).collect();
        symbols.extend([1, 300, 5, 299, 1]);
        let tree = round_trip(&symbols, EscapeCoding::Gamma);
        assert_eq!(tree.leaf_count(), 257);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn huffman_round_trip(symbols in prop::collection::vec(0u32..256, 1..1500)) {
                round_trip(&symbols, EscapeCoding::Byte);
            }

            #[test]
            fn huffman_lengths_round_trip(symbols in prop::collection::vec(1u32..64, 1..800)) {
                round_trip(&symbols, EscapeCoding::Gamma);
            }
        }
    }
}
