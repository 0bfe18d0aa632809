use mindmap_core::extract::{extract_as, extract_json};
use mindmap_core::outline::{Depth, Node, Outline};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_depth() -> impl Strategy<Value = Depth> {
    prop_oneof![Just(Depth::Two), Just(Depth::Three), Just(Depth::Four)]
}

fn arb_leaf() -> impl Strategy<Value = Node> {
    ("[A-Za-z][A-Za-z0-9 ]{0,15}", "[A-Za-z0-9 ,.{}\"\\\\-]{0,40}")
        .prop_map(|(name, summary)| Node::new(name, summary))
}

fn arb_node() -> impl Strategy<Value = Node> {
    arb_leaf().prop_recursive(2, 24, 4, |inner| {
        (arb_leaf(), prop::collection::vec(inner, 0..4))
            .prop_map(|(node, sub)| node.with_sub(sub))
    })
}

fn arb_outline() -> impl Strategy<Value = Outline> {
    (
        "[A-Za-z][A-Za-z0-9 ]{0,20}",
        arb_depth(),
        prop::collection::vec(arb_node(), 1..5),
    )
        .prop_map(|(title, depth, branches)| Outline::new(title, depth).with_branches(branches))
}

// ---------------------------------------------------------------------------
// 1. Extractor round-trips any outline
// ---------------------------------------------------------------------------
proptest! {
    #[test]
    fn extract_roundtrips_outline(outline in arb_outline()) {
        let json = serde_json::to_string(&outline).unwrap();
        let parsed: Outline = extract_as(&json).unwrap();
        prop_assert_eq!(parsed, outline);
    }
}

// ---------------------------------------------------------------------------
// 2. Brace-free prose around the object does not break extraction
// ---------------------------------------------------------------------------
proptest! {
    #[test]
    fn extract_ignores_surrounding_prose(
        outline in arb_outline(),
        prefix in "[A-Za-z .:\n]{0,40}",
        suffix in "[A-Za-z .\n]{0,40}",
    ) {
        let json = serde_json::to_string(&outline).unwrap();
        let text = format!("{prefix}{json}{suffix}");
        let parsed: Outline = extract_as(&text).unwrap();
        prop_assert_eq!(parsed, outline);
    }
}

// ---------------------------------------------------------------------------
// 3. Text without braces never yields a value and never panics
// ---------------------------------------------------------------------------
proptest! {
    #[test]
    fn brace_free_text_is_none(text in "[^{}]{0,80}") {
        // Bare scalars and arrays are not objects either.
        prop_assert!(extract_json(&text).is_none());
    }
}

// ---------------------------------------------------------------------------
// 4. Pruning always leaves the outline within its depth
// ---------------------------------------------------------------------------
proptest! {
    #[test]
    fn prune_respects_depth(outline in arb_outline()) {
        let mut outline = outline;
        let before = outline.node_count();
        let removed = outline.prune_to_depth();
        prop_assert!(outline.max_level() <= outline.depth.as_u8());
        prop_assert_eq!(outline.node_count() + removed, before);
    }
}
