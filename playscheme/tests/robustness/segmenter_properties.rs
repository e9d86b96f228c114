// Segmenter and reader robustness
// Goal: segmentation is total and order preserving, and reading never panics.

use playscheme::{parse_program, segment};
use proptest::prelude::*;

fn arb_atom() -> impl Strategy<Value = String> {
    prop_oneof![
        (0i64..1000).prop_map(|n| n.to_string()),
        "[a-z][a-z0-9?!-]{0,6}".prop_map(|s| s),
        "[a-z ()]{0,8}".prop_map(|s| format!("\"{}\"", s)),
        Just("#t".to_string()),
        Just("'sym".to_string()),
    ]
}

fn arb_form() -> impl Strategy<Value = String> {
    arb_atom().prop_recursive(4, 32, 5, |inner| {
        prop::collection::vec(inner, 0..5).prop_map(|items| format!("({})", items.join(" ")))
    })
}

fn arb_top_level() -> impl Strategy<Value = String> {
    let list = prop::collection::vec(arb_form(), 0..5)
        .prop_map(|items| format!("({})", items.join(" ")));
    prop_oneof![3 => list, 1 => arb_atom()]
}

proptest! {
    #[test]
    fn segments_are_the_generated_forms_in_order(
        forms in prop::collection::vec(arb_top_level(), 0..8),
        separator in prop_oneof![Just(" "), Just("\n"), Just("\n\n  "), Just("\t")],
    ) {
        let source = forms.join(separator);
        prop_assert_eq!(segment(&source), forms);
    }

    #[test]
    fn segmenting_a_segment_is_identity(forms in prop::collection::vec(arb_top_level(), 1..6)) {
        for expression in segment(&forms.join(" ")) {
            prop_assert_eq!(segment(&expression), vec![expression.clone()]);
        }
    }

    #[test]
    fn every_segment_reads_back(forms in prop::collection::vec(arb_top_level(), 1..6)) {
        for expression in segment(&forms.join("\n")) {
            let data = parse_program(&expression);
            prop_assert!(data.is_ok(), "{:?} failed to read: {:?}", expression, data);
            prop_assert_eq!(data.unwrap().len(), 1);
        }
    }

    #[test]
    fn segmenting_arbitrary_text_never_panics(source in ".{0,200}") {
        let segments = segment(&source);
        prop_assert!(segments.iter().all(|s| !s.trim().is_empty()));
    }

    #[test]
    fn reading_arbitrary_text_never_panics(source in "[()\\[\\]'`,@#\\\\\" a-z0-9.;\n-]{0,120}") {
        let _ = parse_program(&source);
    }
}
