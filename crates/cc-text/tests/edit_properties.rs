//! Property coverage for the edit buffer: bytes outside edited ranges are
//! preserved exactly, regardless of how many edits are recorded or in what
//! order they arrive.

use cc_text::EditBuffer;
use proptest::prelude::*;

/// Generate a source string plus a set of non-overlapping (start, end) ranges.
fn disjoint_edits() -> impl Strategy<Value = (String, Vec<(usize, usize, String)>)> {
    ("[a-z ]{20,120}", proptest::collection::vec(0usize..120, 0..8)).prop_map(|(src, cuts)| {
        let mut bounds: Vec<usize> = cuts.into_iter().map(|c| c % (src.len() + 1)).collect();
        bounds.sort_unstable();
        bounds.dedup();
        let mut edits = Vec::new();
        for pair in bounds.chunks(2) {
            if let [s, e] = pair {
                edits.push((*s, *e, format!("<{}>", e - s)));
            }
        }
        (src, edits)
    })
}

proptest! {
    #[test]
    fn untouched_bytes_survive((src, edits) in disjoint_edits()) {
        let mut eb = EditBuffer::new();
        for (i, (s, e, text)) in edits.iter().enumerate() {
            eb.add(*s, *e, text.clone(), 0, i as u32);
        }
        let out = eb.apply(&src).unwrap();

        // Rebuild the expected output by hand from the gap segments.
        let mut expected = String::new();
        let mut cursor = 0;
        for (s, e, text) in &edits {
            expected.push_str(&src[cursor..*s]);
            expected.push_str(text);
            cursor = *e;
        }
        expected.push_str(&src[cursor..]);
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn arrival_order_is_irrelevant((src, edits) in disjoint_edits()) {
        let mut forward = EditBuffer::new();
        for (i, (s, e, text)) in edits.iter().enumerate() {
            forward.add(*s, *e, text.clone(), 0, i as u32);
        }
        let mut backward = EditBuffer::new();
        for (i, (s, e, text)) in edits.iter().enumerate().rev() {
            backward.add(*s, *e, text.clone(), 0, i as u32);
        }
        prop_assert_eq!(forward.apply(&src).unwrap(), backward.apply(&src).unwrap());
    }
}
