//! Binary search tree over the LZSS sliding window.
//!
//! There is one node per window position plus a virtual root.  Nodes are
//! ordered by the byte strings that start at their window positions, compared
//! out to the look-ahead length.  Links are indices into the node arena, with
//! index 0 doubling as the "no node" sentinel, which is why window position 0
//! is never indexed.  The virtual root sits at index `WIN_SIZE` and only ever
//! uses its larger-child link.

use super::ring_buffer::RingBuffer;

/// sentinel for parent/child links
pub const UNUSED: usize = 0;

#[derive(Clone,Copy,Default,Debug)]
struct Node {
    parent: usize,
    smaller: usize,
    larger: usize
}

pub struct MatchTree {
    nodes: Vec<Node>,
    root: usize,
    look_ahead: usize
}

impl MatchTree {
    /// Create a tree for a window of `win_size` positions, matching up to `look_ahead` bytes.
    pub fn create(win_size: usize,look_ahead: usize) -> Self {
        Self {
            nodes: vec![Node::default();win_size+1],
            root: win_size,
            look_ahead
        }
    }
    /// Reset every node to unused and make `r` the sole child of the root.
    pub fn init(&mut self,r: usize) {
        for node in self.nodes.iter_mut() {
            *node = Node::default();
        }
        self.nodes[self.root].larger = r;
        self.nodes[r].parent = self.root;
    }
    /// Is position `p` currently indexed
    pub fn contains(&self,p: usize) -> bool {
        p != UNUSED && self.nodes[p].parent != UNUSED
    }
    fn set_parent(&mut self,child: usize,parent: usize) {
        if child != UNUSED {
            self.nodes[child].parent = parent;
        }
    }
    /// Index `new_node` and report the longest earlier match as (length, position).
    /// The search follows the path the new node is inserted along; the first match of
    /// the greatest length on that path wins.  A match of the full look-ahead length
    /// means the old node is redundant, so the new node takes its place in the tree.
    pub fn insert(&mut self,new_node: usize,window: &RingBuffer<u8>) -> (usize,usize) {
        if new_node == UNUSED {
            return (0,0);
        }
        let mut test_node = self.nodes[self.root].larger;
        if test_node == UNUSED {
            self.nodes[self.root].larger = new_node;
            self.nodes[new_node] = Node { parent: self.root, smaller: UNUSED, larger: UNUSED };
            return (0,0);
        }
        let mut match_length = 0;
        let mut match_position = 0;
        loop {
            let mut i = 0;
            let mut delta: i16 = 0;
            // upon exiting this loop, `i` has the number of matched bytes,
            // and `delta` has the difference in the first mismatched bytes.
            while i < self.look_ahead {
                delta = window.get_abs(new_node+i) as i16 - window.get_abs(test_node+i) as i16;
                if delta != 0 {
                    break;
                }
                i += 1;
            }
            if i > match_length {
                match_length = i;
                match_position = test_node;
                if match_length >= self.look_ahead {
                    self.replace(test_node,new_node);
                    return (match_length,match_position);
                }
            }
            let child = match delta >= 0 {
                true => self.nodes[test_node].larger,
                false => self.nodes[test_node].smaller
            };
            if child == UNUSED {
                match delta >= 0 {
                    true => self.nodes[test_node].larger = new_node,
                    false => self.nodes[test_node].smaller = new_node
                }
                self.nodes[new_node] = Node { parent: test_node, smaller: UNUSED, larger: UNUSED };
                return (match_length,match_position);
            }
            test_node = child;
        }
    }
    /// Remove position `p` from the tree, if it is there.
    pub fn delete(&mut self,p: usize) {
        if !self.contains(p) {
            return;
        }
        if self.nodes[p].larger == UNUSED {
            self.contract(p,self.nodes[p].smaller);
        } else if self.nodes[p].smaller == UNUSED {
            self.contract(p,self.nodes[p].larger);
        } else {
            let replacement = self.predecessor(p);
            self.delete(replacement);
            self.replace(p,replacement);
        }
    }
    /// Splice `old_node` out by linking its parent directly to `new_node`, which may be `UNUSED`.
    fn contract(&mut self,old_node: usize,new_node: usize) {
        let parent = self.nodes[old_node].parent;
        self.set_parent(new_node,parent);
        if self.nodes[parent].larger == old_node {
            self.nodes[parent].larger = new_node;
        } else {
            self.nodes[parent].smaller = new_node;
        }
        self.nodes[old_node].parent = UNUSED;
    }
    /// Put `new_node` in the exact place of `old_node`, taking over all of its links.
    fn replace(&mut self,old_node: usize,new_node: usize) {
        let parent = self.nodes[old_node].parent;
        if self.nodes[parent].smaller == old_node {
            self.nodes[parent].smaller = new_node;
        } else {
            self.nodes[parent].larger = new_node;
        }
        self.nodes[new_node] = self.nodes[old_node];
        self.set_parent(self.nodes[new_node].smaller,new_node);
        self.set_parent(self.nodes[new_node].larger,new_node);
        self.nodes[old_node].parent = UNUSED;
    }
    /// in-order predecessor: rightmost node of the smaller subtree
    fn predecessor(&self,node: usize) -> usize {
        let mut next = self.nodes[node].smaller;
        while self.nodes[next].larger != UNUSED {
            next = self.nodes[next].larger;
        }
        next
    }
}

#[cfg(test)]
impl MatchTree {
    /// positions in order, checking parent links along the way
    fn in_order(&self) -> Vec<usize> {
        fn walk(tree: &MatchTree,node: usize,ans: &mut Vec<usize>) {
            if node == UNUSED {
                return;
            }
            let n = tree.nodes[node];
            for child in [n.smaller,n.larger] {
                if child != UNUSED {
                    assert_eq!(tree.nodes[child].parent,node,"broken parent link");
                }
            }
            walk(tree,n.smaller,ans);
            ans.push(node);
            walk(tree,n.larger,ans);
        }
        assert_eq!(self.nodes[self.root].smaller,UNUSED);
        let mut ans = Vec::new();
        walk(self,self.nodes[self.root].larger,&mut ans);
        ans
    }
}

#[cfg(test)]
fn load(text: &[u8],size: usize) -> RingBuffer<u8> {
    let mut window = RingBuffer::create(0,size);
    for (i,c) in text.iter().enumerate() {
        window.set_abs(i+1,*c);
    }
    window
}

#[cfg(test)]
fn key(window: &RingBuffer<u8>,p: usize,look_ahead: usize) -> Vec<u8> {
    (0..look_ahead).map(|i| window.get_abs(p+i)).collect()
}

#[test]
fn finds_longest_match() {
    // positions start at 1, as in the codec
    let window = load("abcdxabcyabcd".as_bytes(),64);
    let mut tree = MatchTree::create(64,4);
    tree.init(1);
    assert_eq!(tree.insert(2,&window).0,0);
    assert_eq!(tree.insert(6,&window),(3,1));
    assert_eq!(tree.insert(10,&window),(4,1));
    // the full length match took over the old node
    assert!(!tree.contains(1));
    assert!(tree.contains(10));
}

#[test]
fn ties_keep_first_found() {
    // "ab" occurs at 1 and 4, both match "abz" to length 2
    let window = load("abxabyabz".as_bytes(),64);
    let mut tree = MatchTree::create(64,3);
    tree.init(1);
    assert_eq!(tree.insert(4,&window),(2,1));
    assert_eq!(tree.insert(7,&window),(2,1));
}

#[test]
fn position_zero_not_indexed() {
    let window = load("aaaa".as_bytes(),8);
    let mut tree = MatchTree::create(8,2);
    tree.init(1);
    assert_eq!(tree.insert(UNUSED,&window),(0,0));
    assert!(!tree.contains(UNUSED));
    tree.delete(UNUSED);
    assert_eq!(tree.in_order(),vec![1]);
}

#[test]
fn order_survives_churn() {
    let text = "the rain in spain falls mainly on the plain, then it drains into the main".as_bytes();
    let size = 128;
    let look_ahead = 5;
    let window = load(text,size);
    let mut tree = MatchTree::create(size,look_ahead);
    tree.init(1);
    for p in 2..=text.len() {
        tree.insert(p,&window);
    }
    // delete in an order that exercises leaf, one-child, and two-child removals
    for p in (1..=text.len()).step_by(3).chain((2..=text.len()).step_by(3)) {
        tree.delete(p);
        assert!(!tree.contains(p));
        let order = tree.in_order();
        for pair in order.windows(2) {
            assert!(key(&window,pair[0],look_ahead) <= key(&window,pair[1],look_ahead));
        }
    }
    let survivors = tree.in_order();
    assert!(survivors.iter().all(|p| p % 3 == 0));
}
