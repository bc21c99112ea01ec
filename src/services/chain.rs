// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deed chain logic: linking, contribution propagation, and tree building.
//!
//! The deeds of one challenge form a tree rooted at the originator's deed.
//! Linking and counter propagation are computed here as plain in-memory
//! transformations; the database layer persists the resulting writes in a
//! single transaction so a completion is all-or-nothing.

use crate::models::Deed;
use serde::Serialize;
use std::collections::HashMap;

/// Upper bound on backward traversal, so corrupt data fails instead of
/// looping forever.
pub const MAX_CHAIN_DEPTH: usize = 10_000;

/// Errors from chain traversal over persisted deeds.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Deed chain contains a cycle involving deed {0}")]
    Cycle(String),

    #[error("Deed chain exceeds maximum traversal depth")]
    DepthExceeded,
}

/// The set of deed documents a completion must persist together.
#[derive(Debug, Clone)]
pub struct CompletionWrites {
    /// The freshly created deed
    pub new_deed: Deed,
    /// Predecessor and ancestors with updated pointers/counters
    pub touched: Vec<Deed>,
}

/// Link a new deed behind its predecessor and bump every ancestor's
/// contribution counter by one.
///
/// `ancestors` must be the backward chain starting at the predecessor's
/// own predecessor (strict ancestors). When the actor was not nominated by
/// anyone with a deed in the challenge, `predecessor` is `None` and the
/// new deed becomes a chain root.
pub fn link_completion(
    mut new_deed: Deed,
    predecessor: Option<Deed>,
    ancestors: Vec<Deed>,
) -> CompletionWrites {
    let mut touched = Vec::with_capacity(ancestors.len() + 1);

    if let Some(mut prev) = predecessor {
        new_deed.prev_deed_id = Some(prev.id.clone());
        prev.next_deed_id = Some(new_deed.id.clone());
        prev.num_contributions += 1;
        touched.push(prev);

        for mut ancestor in ancestors {
            ancestor.num_contributions += 1;
            touched.push(ancestor);
        }
    }

    CompletionWrites { new_deed, touched }
}

/// One node of a challenge's chain tree, children ordered by completion
/// time.
#[derive(Debug, Serialize)]
pub struct ChainNode {
    #[serde(flatten)]
    pub deed: Deed,
    pub children: Vec<ChainNode>,
}

/// Build the chain forest for one challenge from its full deed set.
///
/// Normally the forest is a single tree rooted at the originator's deed,
/// but unlinked deeds (predecessor lookup failed at completion time) and
/// deeds whose predecessor is missing become extra roots rather than
/// errors. A cycle in the pointer data is an error.
pub fn build_chain_forest(deeds: Vec<Deed>) -> Result<Vec<ChainNode>, ChainError> {
    let total = deeds.len();
    let ids: std::collections::HashSet<String> = deeds.iter().map(|d| d.id.clone()).collect();

    let mut roots: Vec<Deed> = Vec::new();
    let mut children_of: HashMap<String, Vec<Deed>> = HashMap::new();

    for deed in deeds {
        match &deed.prev_deed_id {
            Some(prev) if ids.contains(prev) => {
                children_of.entry(prev.clone()).or_default().push(deed);
            }
            // Dangling predecessor reference: treat as an orphan root
            _ => roots.push(deed),
        }
    }

    roots.sort_by(|a, b| a.done_at.cmp(&b.done_at));

    let mut visited = 0usize;
    let forest: Vec<ChainNode> = roots
        .into_iter()
        .map(|root| attach_children(root, &mut children_of, &mut visited))
        .collect();

    if visited != total {
        // Whatever is left in the children map is unreachable from any
        // root, which can only happen if the pointers loop.
        let stuck = children_of
            .values()
            .flatten()
            .next()
            .map(|d| d.id.clone())
            .unwrap_or_default();
        return Err(ChainError::Cycle(stuck));
    }

    Ok(forest)
}

/// One in-progress node of the iterative tree build.
struct BuildFrame {
    deed: Deed,
    /// Children still to descend into, reversed so `pop` yields done_at order
    pending: Vec<Deed>,
    built: Vec<ChainNode>,
}

fn open_frame(
    deed: Deed,
    children_of: &mut HashMap<String, Vec<Deed>>,
    visited: &mut usize,
) -> BuildFrame {
    *visited += 1;
    let mut pending = children_of.remove(&deed.id).unwrap_or_default();
    pending.sort_by(|a, b| b.done_at.cmp(&a.done_at));
    BuildFrame {
        deed,
        pending,
        built: Vec::new(),
    }
}

/// Depth-first build with an explicit stack, so chain depth is bounded by
/// the heap rather than the call stack.
fn attach_children(
    root: Deed,
    children_of: &mut HashMap<String, Vec<Deed>>,
    visited: &mut usize,
) -> ChainNode {
    let mut stack = vec![open_frame(root, children_of, visited)];

    loop {
        let next_child = stack.last_mut().and_then(|frame| frame.pending.pop());
        if let Some(child) = next_child {
            let frame = open_frame(child, children_of, visited);
            stack.push(frame);
            continue;
        }

        if let Some(frame) = stack.pop() {
            let node = ChainNode {
                deed: frame.deed,
                children: frame.built,
            };
            match stack.last_mut() {
                Some(parent) => parent.built.push(node),
                // The root frame is always the last one folded.
                None => return node,
            }
        }
    }
}

/// Recompute the correct contribution counter for every deed in a
/// challenge: 1 + the size of the subtree hanging off it.
///
/// Used by tests and repair tooling to check the incrementally maintained
/// counters.
pub fn recompute_contributions(deeds: Vec<Deed>) -> Result<HashMap<String, u32>, ChainError> {
    let forest = build_chain_forest(deeds)?;
    let mut counts = HashMap::new();
    for root in &forest {
        subtree_sizes(root, &mut counts);
    }
    Ok(counts)
}

/// Post-order subtree sizing with an explicit stack: children are tallied
/// before their parent reads their counts back.
fn subtree_sizes(root: &ChainNode, counts: &mut HashMap<String, u32>) {
    enum Step<'a> {
        Enter(&'a ChainNode),
        Tally(&'a ChainNode),
    }

    let mut stack = vec![Step::Enter(root)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(node) => {
                stack.push(Step::Tally(node));
                for child in &node.children {
                    stack.push(Step::Enter(child));
                }
            }
            Step::Tally(node) => {
                let size = 1 + node
                    .children
                    .iter()
                    .map(|c| counts.get(&c.deed.id).copied().unwrap_or(0))
                    .sum::<u32>();
                counts.insert(node.deed.id.clone(), size);
            }
        }
    }
}

/// Return the ids of deeds whose stored counter disagrees with a full
/// recompute, sorted for stable output.
pub fn verify_contributions(deeds: &[Deed]) -> Result<Vec<String>, ChainError> {
    let counts = recompute_contributions(deeds.to_vec())?;
    let mut mismatched: Vec<String> = deeds
        .iter()
        .filter(|d| counts.get(&d.id) != Some(&d.num_contributions))
        .map(|d| d.id.clone())
        .collect();
    mismatched.sort();
    Ok(mismatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;

    fn make_deed(id: &str, user: &str, done_at: &str) -> Deed {
        Deed::unlinked(
            id.to_string(),
            user.to_string(),
            "challenge-1".to_string(),
            "https://example.com/pic.jpg".to_string(),
            "done".to_string(),
            GeoPoint { lat: 51.5, lng: -0.12 },
            done_at.to_string(),
        )
    }

    /// Apply a completion's writes to an in-memory store, the way the
    /// database transaction does.
    fn apply(writes: CompletionWrites, store: &mut HashMap<String, Deed>) {
        store.insert(writes.new_deed.id.clone(), writes.new_deed);
        for deed in writes.touched {
            store.insert(deed.id.clone(), deed);
        }
    }

    fn ancestors_of(store: &HashMap<String, Deed>, start: Option<String>) -> Vec<Deed> {
        let mut out = Vec::new();
        let mut cursor = start;
        while let Some(id) = cursor {
            let deed = store.get(&id).expect("ancestor must exist").clone();
            cursor = deed.prev_deed_id.clone();
            out.push(deed);
        }
        out
    }

    #[test]
    fn test_root_completion_stays_unlinked() {
        let writes = link_completion(make_deed("r", "alice", "2025-06-01T10:00:00Z"), None, vec![]);

        assert_eq!(writes.new_deed.prev_deed_id, None);
        assert_eq!(writes.new_deed.num_contributions, 1);
        assert!(writes.touched.is_empty());
    }

    #[test]
    fn test_scenario_counts_propagate_to_root() {
        // Root R, then A nominated by R's author, then B nominated by A.
        let mut store = HashMap::new();
        apply(
            link_completion(make_deed("r", "alice", "2025-06-01T10:00:00Z"), None, vec![]),
            &mut store,
        );

        let pred = store.get("r").cloned();
        apply(
            link_completion(make_deed("a", "bob", "2025-06-02T10:00:00Z"), pred, vec![]),
            &mut store,
        );
        assert_eq!(store["r"].num_contributions, 2);
        assert_eq!(store["r"].next_deed_id.as_deref(), Some("a"));
        assert_eq!(store["a"].prev_deed_id.as_deref(), Some("r"));

        let pred = store.get("a").cloned();
        let ancestors = ancestors_of(&store, pred.as_ref().and_then(|p| p.prev_deed_id.clone()));
        apply(
            link_completion(make_deed("b", "carol", "2025-06-03T10:00:00Z"), pred, ancestors),
            &mut store,
        );

        assert_eq!(store["r"].num_contributions, 3);
        assert_eq!(store["a"].num_contributions, 2);
        assert_eq!(store["b"].num_contributions, 1);
        assert_eq!(store["a"].next_deed_id.as_deref(), Some("b"));

        // Incremental counters must agree with a full recompute.
        let deeds: Vec<Deed> = store.values().cloned().collect();
        assert!(verify_contributions(&deeds).unwrap().is_empty());
    }

    #[test]
    fn test_forest_has_single_root_for_linked_chain() {
        let mut store = HashMap::new();
        apply(
            link_completion(make_deed("r", "alice", "2025-06-01T10:00:00Z"), None, vec![]),
            &mut store,
        );
        let pred = store.get("r").cloned();
        apply(
            link_completion(make_deed("a", "bob", "2025-06-02T10:00:00Z"), pred, vec![]),
            &mut store,
        );

        let forest = build_chain_forest(store.values().cloned().collect()).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].deed.id, "r");
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].deed.id, "a");
    }

    #[test]
    fn test_branching_children_sorted_by_done_at() {
        let root = make_deed("r", "alice", "2025-06-01T10:00:00Z");
        let mut late = make_deed("late", "bob", "2025-06-03T10:00:00Z");
        late.prev_deed_id = Some("r".to_string());
        let mut early = make_deed("early", "carol", "2025-06-02T10:00:00Z");
        early.prev_deed_id = Some("r".to_string());

        let forest = build_chain_forest(vec![root, late, early]).unwrap();
        let child_ids: Vec<&str> = forest[0]
            .children
            .iter()
            .map(|c| c.deed.id.as_str())
            .collect();
        assert_eq!(child_ids, vec!["early", "late"]);
    }

    #[test]
    fn test_dangling_predecessor_becomes_orphan_root() {
        let mut orphan = make_deed("o", "bob", "2025-06-02T10:00:00Z");
        orphan.prev_deed_id = Some("gone".to_string());
        let root = make_deed("r", "alice", "2025-06-01T10:00:00Z");

        let forest = build_chain_forest(vec![root, orphan]).unwrap();
        assert_eq!(forest.len(), 2);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut a = make_deed("a", "alice", "2025-06-01T10:00:00Z");
        let mut b = make_deed("b", "bob", "2025-06-02T10:00:00Z");
        a.prev_deed_id = Some("b".to_string());
        b.prev_deed_id = Some("a".to_string());

        let result = build_chain_forest(vec![a, b]);
        assert!(matches!(result, Err(ChainError::Cycle(_))));
    }

    #[test]
    fn test_deep_chain_builds_without_overflowing_the_stack() {
        // Far deeper than recursion could survive on a test thread.
        let len = 50_000;
        let mut deeds = Vec::with_capacity(len);
        for i in 0..len {
            let mut deed = make_deed(
                &format!("d{:06}", i),
                &format!("u{:06}", i),
                "2025-06-01T10:00:00Z",
            );
            if i > 0 {
                deed.prev_deed_id = Some(format!("d{:06}", i - 1));
            }
            deed.num_contributions = (len - i) as u32;
            deeds.push(deed);
        }

        let forest = build_chain_forest(deeds.clone()).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].deed.id, "d000000");
        assert!(verify_contributions(&deeds).unwrap().is_empty());
    }

    #[test]
    fn test_verify_reports_drifted_counter() {
        let mut root = make_deed("r", "alice", "2025-06-01T10:00:00Z");
        let mut child = make_deed("a", "bob", "2025-06-02T10:00:00Z");
        child.prev_deed_id = Some("r".to_string());
        root.next_deed_id = Some("a".to_string());
        // Root should be 2 but a lost update left it at 1.
        root.num_contributions = 1;

        let mismatched = verify_contributions(&[root, child]).unwrap();
        assert_eq!(mismatched, vec!["r".to_string()]);
    }
}
