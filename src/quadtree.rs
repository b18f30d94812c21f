use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use slotmap::{Key, SecondaryMap};

use crate::list::List;
use crate::rect::Rect;
use crate::QuadtreeVisitor;

/// Objects a node keeps in its own list before it splits.
pub const MAX_OBJECTS: usize = 10;

/// Deepest level allowed to split when the config leaves it unset.
pub const DEFAULT_MAX_DEPTH: u32 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadtreeConfig {
    /// Own-list size a leaf may reach; one more triggers the split.
    pub max_objects: usize,
    /// Deepest level allowed to split. `DEFAULT_MAX_DEPTH` when unset.
    pub max_depth: Option<u32>,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            max_objects: MAX_OBJECTS,
            max_depth: None,
        }
    }
}

/// Child slots, in the order children are stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    TopRight = 0,
    TopLeft = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopRight,
        Quadrant::TopLeft,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Quadrant of `bounds` that fully holds `rect`, if any.
    ///
    /// An edge lying on the center line still fits the near side; anything
    /// crossing it stays with the parent.
    pub fn classify(bounds: &Rect, rect: &Rect) -> Option<Quadrant> {
        let center = bounds.center();

        let top = rect.y <= center.y && rect.bottom() <= center.y;
        let bottom = rect.y >= center.y;

        if rect.x <= center.x && rect.right() <= center.x {
            if top {
                Some(Quadrant::TopLeft)
            } else if bottom {
                Some(Quadrant::BottomLeft)
            } else {
                None
            }
        } else if rect.x >= center.x {
            if top {
                Some(Quadrant::TopRight)
            } else if bottom {
                Some(Quadrant::BottomRight)
            } else {
                None
            }
        } else {
            None
        }
    }

    fn bounds_within(self, parent: &Rect) -> Rect {
        let w = parent.width / 2.0;
        let h = parent.height / 2.0;
        match self {
            Quadrant::TopRight => Rect::new(parent.x + w, parent.y, w, h),
            Quadrant::TopLeft => Rect::new(parent.x, parent.y, w, h),
            Quadrant::BottomLeft => Rect::new(parent.x, parent.y + h, w, h),
            Quadrant::BottomRight => Rect::new(parent.x + w, parent.y + h, w, h),
        }
    }
}

#[derive(Clone, Debug)]
struct Node<K> {
    bounds: Rect,
    level: u32,
    objects: Vec<K>,
    children: Option<[usize; 4]>,
}

impl<K> Node<K> {
    fn new(level: u32, bounds: Rect) -> Self {
        Self {
            bounds,
            level,
            objects: Vec::new(),
            children: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.children.is_none() && self.objects.is_empty()
    }
}

/// Region quadtree over externally owned rectangles.
///
/// The tree stores handles only. Alongside them it remembers the rectangle
/// each handle was placed with, so removal always walks to the node the
/// handle actually lives in, whatever the owner has done to its geometry
/// since.
pub struct Quadtree<K: Key> {
    root: usize,
    max_objects: usize,
    max_depth: u32,
    nodes: List<Node<K>>,
    placed: SecondaryMap<K, Rect>,
}

impl<K: Key> Quadtree<K> {
    pub fn new(bounds: Rect) -> Self {
        Self::with_config(bounds, QuadtreeConfig::default())
    }

    pub fn with_config(bounds: Rect, config: QuadtreeConfig) -> Self {
        let mut nodes = List::new();
        let root = nodes.insert(Node::new(0, bounds));
        Self {
            root,
            max_objects: config.max_objects.max(1),
            max_depth: config.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            nodes,
            placed: SecondaryMap::new(),
        }
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[self.root].bounds
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Number of handles currently stored.
    pub fn len(&self) -> usize {
        self.placed.len()
    }

    /// True when the root holds nothing and has no children.
    pub fn is_empty(&self) -> bool {
        self.nodes[self.root].is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.placed.contains_key(key)
    }

    /// Rectangle `key` was last inserted or updated with.
    pub fn placed(&self, key: K) -> Option<Rect> {
        self.placed.get(key).copied()
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.size()
    }

    /// Level of the deepest live node.
    pub fn depth(&self) -> u32 {
        let mut deepest = 0;
        let mut to_process = vec![self.root];
        while let Some(idx) = to_process.pop() {
            let node = &self.nodes[idx];
            deepest = deepest.max(node.level);
            if let Some(children) = node.children {
                to_process.extend_from_slice(&children);
            }
        }
        deepest
    }

    /// Stores `key` with geometry `rect`. A key that is already present is
    /// relocated.
    pub fn insert(&mut self, key: K, rect: Rect) {
        if self.placed.contains_key(key) {
            self.remove(key);
        }
        if !self.bounds().contains(&rect) {
            warn!("inserting {:?} at {:?}, outside index bounds {:?}", key, rect, self.bounds());
        }
        self.placed.insert(key, rect);
        self.node_insert(self.root, key, rect);
    }

    /// Drops `key` from the tree, returning the geometry it was stored with.
    /// Absent keys are ignored.
    pub fn remove(&mut self, key: K) -> Option<Rect> {
        let rect = self.placed.remove(key)?;
        self.node_remove(self.root, key, &rect);
        Some(rect)
    }

    /// Re-files `key` under its new geometry.
    pub fn update(&mut self, key: K, rect: Rect) {
        self.remove(key);
        self.insert(key, rect);
    }

    /// Appends every handle that may overlap `rect`. This is a pruning
    /// filter only; callers test exact overlap themselves.
    pub fn retrieve(&self, rect: &Rect, out: &mut Vec<K>) {
        self.node_retrieve(self.root, rect, out);
    }

    /// Handles whose placed rectangle overlaps `rect`.
    pub fn query(&self, rect: &Rect) -> Vec<K> {
        let mut out = Vec::new();
        self.retrieve(rect, &mut out);
        out.retain(|key| self.placed.get(*key).map_or(false, |r| r.overlaps(rect)));
        out
    }

    /// Empties the tree down to a bare root.
    pub fn clear(&mut self) {
        let bounds = self.bounds();
        self.nodes.clear();
        self.placed.clear();
        self.root = self.nodes.insert(Node::new(0, bounds));
    }

    pub fn traverse<V>(&self, visitor: &mut V)
        where
            V: QuadtreeVisitor<K>,
    {
        let mut to_process = vec![self.root];

        while let Some(idx) = to_process.pop() {
            let node = &self.nodes[idx];
            match node.children {
                Some(children) => {
                    visitor.branch(node.level, &node.bounds);
                    to_process.extend_from_slice(&children);
                }
                None => visitor.leaf(node.level, &node.bounds),
            }
            for key in &node.objects {
                if let Some(rect) = self.placed.get(*key) {
                    visitor.object(*key, rect);
                }
            }
        }
    }

    fn node_insert(&mut self, idx: usize, key: K, rect: Rect) {
        let node = &self.nodes[idx];
        if let Some(children) = node.children {
            if let Some(quadrant) = Quadrant::classify(&node.bounds, &rect) {
                self.node_insert(children[quadrant.index()], key, rect);
                return;
            }
        }

        let node = &mut self.nodes[idx];
        node.objects.push(key);

        // Split once; a node that already has children just keeps what straddles.
        if node.objects.len() > self.max_objects && node.children.is_none() {
            if node.level >= self.max_depth {
                trace!("node at level {} is full but at max depth", node.level);
                return;
            }
            self.split(idx);
            self.redistribute(idx);
        }
    }

    fn split(&mut self, idx: usize) {
        let bounds = self.nodes[idx].bounds;
        let level = self.nodes[idx].level + 1;
        let children = Quadrant::ALL
            .map(|quadrant| self.nodes.insert(Node::new(level, quadrant.bounds_within(&bounds))));
        self.nodes[idx].children = Some(children);
        debug!("split node at level {} with bounds {:?}", level - 1, bounds);
    }

    fn redistribute(&mut self, idx: usize) {
        let Some(children) = self.nodes[idx].children else {
            return;
        };
        let bounds = self.nodes[idx].bounds;
        let objects = std::mem::take(&mut self.nodes[idx].objects);
        let mut stay = Vec::with_capacity(objects.len());

        for key in objects {
            let Some(rect) = self.placed.get(key).copied() else {
                continue;
            };
            match Quadrant::classify(&bounds, &rect) {
                Some(quadrant) => self.node_insert(children[quadrant.index()], key, rect),
                None => stay.push(key),
            }
        }
        self.nodes[idx].objects = stay;
    }

    fn node_remove(&mut self, idx: usize, key: K, rect: &Rect) {
        let node = &self.nodes[idx];
        let Some(children) = node.children else {
            Self::erase(&mut self.nodes[idx].objects, key);
            return;
        };

        match Quadrant::classify(&node.bounds, rect) {
            Some(quadrant) => self.node_remove(children[quadrant.index()], key, rect),
            None => Self::erase(&mut self.nodes[idx].objects, key),
        }

        if self.nodes[idx].objects.is_empty()
            && children.iter().all(|&child| self.nodes[child].is_empty())
        {
            debug!("merging node at level {} back into a leaf", self.nodes[idx].level);
            self.clear_node(idx);
        }
    }

    fn erase(objects: &mut Vec<K>, key: K) {
        if let Some(pos) = objects.iter().position(|k| *k == key) {
            objects.swap_remove(pos);
        }
    }

    /// Frees every descendant of `idx` and empties its own list.
    fn clear_node(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        node.objects.clear();
        let Some(children) = node.children.take() else {
            return;
        };
        for child in children {
            self.clear_node(child);
            self.nodes.erase(child);
        }
    }

    fn node_retrieve(&self, idx: usize, rect: &Rect, out: &mut Vec<K>) {
        let node = &self.nodes[idx];
        if let Some(children) = node.children {
            match Quadrant::classify(&node.bounds, rect) {
                Some(quadrant) => self.node_retrieve(children[quadrant.index()], rect, out),
                None => {
                    for child in children {
                        self.node_retrieve(child, rect, out);
                    }
                }
            }
        }
        out.extend_from_slice(&node.objects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::{DefaultKey, SlotMap};

    fn world() -> Rect {
        Rect::new(0.0, 0.0, 100.0, 100.0)
    }

    fn keys(n: usize) -> Vec<DefaultKey> {
        let mut map = SlotMap::new();
        (0..n).map(|i| map.insert(i)).collect()
    }

    fn sorted(mut v: Vec<DefaultKey>) -> Vec<DefaultKey> {
        v.sort();
        v
    }

    #[test]
    fn classify_quadrants() {
        let b = world();
        assert_eq!(Quadrant::classify(&b, &Rect::new(60.0, 10.0, 5.0, 5.0)), Some(Quadrant::TopRight));
        assert_eq!(Quadrant::classify(&b, &Rect::new(10.0, 10.0, 5.0, 5.0)), Some(Quadrant::TopLeft));
        assert_eq!(Quadrant::classify(&b, &Rect::new(10.0, 60.0, 5.0, 5.0)), Some(Quadrant::BottomLeft));
        assert_eq!(Quadrant::classify(&b, &Rect::new(60.0, 60.0, 5.0, 5.0)), Some(Quadrant::BottomRight));
    }

    #[test]
    fn classify_straddling_and_center_line() {
        let b = world();
        assert_eq!(Quadrant::classify(&b, &Rect::new(48.0, 10.0, 4.0, 4.0)), None);
        assert_eq!(Quadrant::classify(&b, &Rect::new(10.0, 48.0, 4.0, 4.0)), None);
        assert_eq!(Quadrant::classify(&b, &Rect::new(48.0, 48.0, 4.0, 4.0)), None);

        // Edges resting on the center line still fit.
        assert_eq!(Quadrant::classify(&b, &Rect::new(46.0, 46.0, 4.0, 4.0)), Some(Quadrant::TopLeft));
        assert_eq!(Quadrant::classify(&b, &Rect::new(50.0, 50.0, 4.0, 4.0)), Some(Quadrant::BottomRight));
        assert_eq!(Quadrant::classify(&b, &Rect::new(50.0, 46.0, 4.0, 4.0)), Some(Quadrant::TopRight));
    }

    #[test]
    fn out_of_bounds_rect_stays_at_root() {
        let b = world();
        assert_eq!(Quadrant::classify(&b, &Rect::new(-20.0, 40.0, 80.0, 4.0)), None);

        let k = keys(1);
        let mut tree = Quadtree::new(b);
        tree.insert(k[0], Rect::new(-20.0, 40.0, 80.0, 4.0));
        assert_eq!(tree.retrieve_all(), k);
    }

    #[test]
    fn max_depth_defaults_independently_of_world_size() {
        let tree = Quadtree::<DefaultKey>::new(world());
        assert_eq!(tree.max_depth(), DEFAULT_MAX_DEPTH);
        let tiny = Quadtree::<DefaultKey>::new(Rect::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(tiny.max_depth(), DEFAULT_MAX_DEPTH);

        let tree = Quadtree::<DefaultKey>::with_config(
            world(),
            QuadtreeConfig { max_objects: 4, max_depth: Some(2) },
        );
        assert_eq!(tree.max_depth(), 2);
    }

    #[test]
    fn eleventh_object_splits_once() {
        let k = keys(11);
        let mut tree = Quadtree::new(world());

        for (i, key) in k.iter().take(10).enumerate() {
            tree.insert(*key, Rect::new(5.0 + i as f32 * 8.0, 5.0 + i as f32 * 8.0, 1.0, 1.0));
        }
        assert_eq!(tree.node_count(), 1);

        tree.insert(k[10], Rect::new(90.0, 10.0, 1.0, 1.0));
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.depth(), 1);
        assert_eq!(sorted(tree.retrieve_all()), sorted(k));
    }

    #[test]
    fn small_world_splits_on_eleventh_object() {
        let k = keys(11);
        let mut tree = Quadtree::new(Rect::new(0.0, 0.0, 2.0, 2.0));
        for (i, key) in k.iter().enumerate() {
            let x = if i % 2 == 0 { 0.1 + i as f32 * 0.05 } else { 1.1 + i as f32 * 0.05 };
            let y = if i % 4 < 2 { 0.2 } else { 1.5 };
            tree.insert(*key, Rect::new(x, y, 0.05, 0.05));
        }
        assert_eq!(tree.node_count(), 5);
        assert_eq!(sorted(tree.retrieve_all()), sorted(k));
    }

    #[test]
    fn infinite_bounds_construct_and_accept_inserts() {
        let k = keys(12);
        let mut tree = Quadtree::new(Rect::new(0.0, 0.0, f32::INFINITY, f32::INFINITY));
        for (i, key) in k.iter().enumerate() {
            tree.insert(*key, Rect::new(i as f32 * 3.0, 1.0, 1.0, 1.0));
        }
        assert!(tree.depth() <= tree.max_depth());
        assert_eq!(tree.len(), 12);
    }

    #[test]
    fn straddlers_do_not_split_further() {
        let k = keys(15);
        let mut tree = Quadtree::new(world());
        for key in &k {
            tree.insert(*key, Rect::new(45.0, 45.0, 10.0, 10.0));
        }
        // Split happens once; everything stays at the root.
        assert_eq!(tree.node_count(), 5);
        let mut out = Vec::new();
        tree.retrieve(&Rect::new(1.0, 1.0, 1.0, 1.0), &mut out);
        assert_eq!(out.len(), 15);
    }

    #[test]
    fn coincident_points_stop_at_max_depth() {
        let k = keys(30);
        let mut tree = Quadtree::new(world());
        for key in &k {
            tree.insert(*key, Rect::new(70.0, 70.0, 0.0, 0.0));
        }
        assert_eq!(tree.depth(), tree.max_depth());
        assert_eq!(tree.query(&Rect::new(69.0, 69.0, 2.0, 2.0)).len(), 30);
    }

    #[test]
    fn retrieve_prunes_far_quadrants() {
        let k = keys(12);
        let mut tree = Quadtree::new(world());
        for (i, key) in k.iter().enumerate() {
            let x = if i % 2 == 0 { 10.0 } else { 80.0 };
            tree.insert(*key, Rect::new(x, 10.0 + i as f32, 1.0, 1.0));
        }
        let mut out = Vec::new();
        tree.retrieve(&Rect::new(5.0, 5.0, 10.0, 10.0), &mut out);
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|key| tree.placed(*key).map_or(false, |r| r.x < 50.0)));
    }

    #[test]
    fn straddling_query_visits_all_children() {
        let k = keys(11);
        let mut tree = Quadtree::new(world());
        for (i, key) in k.iter().enumerate() {
            let quadrant_x = if i % 2 == 0 { 10.0 } else { 80.0 };
            let quadrant_y = if i % 4 < 2 { 10.0 } else { 80.0 };
            tree.insert(*key, Rect::new(quadrant_x, quadrant_y + i as f32, 1.0, 1.0));
        }
        let mut out = Vec::new();
        tree.retrieve(&Rect::new(49.0, 49.0, 2.0, 2.0), &mut out);
        assert_eq!(out.len(), 11);
    }

    #[test]
    fn remove_merges_back_to_leaf() {
        let k = keys(11);
        let mut tree = Quadtree::new(world());
        for (i, key) in k.iter().enumerate() {
            tree.insert(*key, Rect::new(2.0 + i as f32 * 9.0, 2.0 + i as f32 * 4.0, 1.0, 1.0));
        }
        assert_eq!(tree.node_count(), 5);

        for key in &k {
            assert!(tree.remove(*key).is_some());
        }
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 0);

        tree.insert(k[3], Rect::new(70.0, 70.0, 2.0, 2.0));
        assert_eq!(tree.query(&Rect::new(69.0, 69.0, 4.0, 4.0)), vec![k[3]]);
    }

    #[test]
    fn removing_last_straddler_merges() {
        let k = keys(11);
        let mut tree = Quadtree::new(world());
        for key in &k[..10] {
            tree.insert(*key, Rect::new(10.0, 10.0, 1.0, 1.0));
        }
        tree.insert(k[10], Rect::new(45.0, 45.0, 10.0, 10.0));
        assert_eq!(tree.node_count(), 5);

        for key in &k[..10] {
            tree.remove(*key);
        }
        assert_eq!(tree.node_count(), 5);
        tree.remove(k[10]);
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn removing_absent_key_is_a_no_op() {
        let k = keys(2);
        let mut tree = Quadtree::new(world());
        tree.insert(k[0], Rect::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(tree.remove(k[1]), None);
        assert_eq!(tree.remove(k[0]), Some(Rect::new(1.0, 1.0, 1.0, 1.0)));
        assert_eq!(tree.remove(k[0]), None);
        assert!(tree.is_empty());
    }

    #[test]
    fn reinsert_relocates_instead_of_duplicating() {
        let k = keys(1);
        let mut tree = Quadtree::new(world());
        tree.insert(k[0], Rect::new(1.0, 1.0, 1.0, 1.0));
        tree.insert(k[0], Rect::new(80.0, 80.0, 1.0, 1.0));
        assert_eq!(tree.retrieve_all(), k);
        assert_eq!(tree.placed(k[0]), Some(Rect::new(80.0, 80.0, 1.0, 1.0)));
    }

    #[test]
    fn update_moves_one_object_and_leaves_others() {
        let k = keys(12);
        let mut tree = Quadtree::new(world());
        let rects: Vec<Rect> = (0..12)
            .map(|i| Rect::new(3.0 + (i % 4) as f32 * 25.0, 3.0 + (i / 4) as f32 * 30.0, 2.0, 2.0))
            .collect();
        for (key, rect) in k.iter().zip(&rects) {
            tree.insert(*key, *rect);
        }

        tree.update(k[0], Rect::new(90.0, 90.0, 2.0, 2.0));

        assert!(!tree.query(&rects[0]).contains(&k[0]));
        assert_eq!(tree.query(&Rect::new(89.0, 89.0, 4.0, 4.0)), vec![k[0]]);
        for (key, rect) in k.iter().zip(&rects).skip(1) {
            assert_eq!(tree.query(rect), vec![*key]);
        }
        assert_eq!(tree.len(), 12);
    }

    #[test]
    fn clear_resets_to_single_root() {
        let k = keys(20);
        let mut tree = Quadtree::new(world());
        for (i, key) in k.iter().enumerate() {
            tree.insert(*key, Rect::new((i * 4) as f32, (i * 4) as f32, 1.0, 1.0));
        }
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.bounds(), world());
    }

    #[derive(Default)]
    struct Counter {
        objects: usize,
        leaves: usize,
        branches: usize,
    }

    impl QuadtreeVisitor<DefaultKey> for Counter {
        fn object(&mut self, _key: DefaultKey, _rect: &Rect) {
            self.objects += 1;
        }
        fn leaf(&mut self, _depth: u32, _bounds: &Rect) {
            self.leaves += 1;
        }
        fn branch(&mut self, _depth: u32, _bounds: &Rect) {
            self.branches += 1;
        }
    }

    #[test]
    fn traverse_visits_every_node_and_object() {
        let k = keys(11);
        let mut tree = Quadtree::new(world());
        for key in &k[..10] {
            tree.insert(*key, Rect::new(10.0, 10.0, 1.0, 1.0));
        }
        tree.insert(k[10], Rect::new(45.0, 45.0, 10.0, 10.0));

        let mut counter = Counter::default();
        tree.traverse(&mut counter);
        assert_eq!(counter.objects, 11);
        assert_eq!(counter.branches, 1);
        assert_eq!(counter.leaves, 4);
    }

    impl<K: Key> Quadtree<K> {
        fn retrieve_all(&self) -> Vec<K> {
            let mut out = Vec::new();
            self.retrieve(&self.bounds(), &mut out);
            out
        }
    }
}
