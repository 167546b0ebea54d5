//! Deferred text-edit collection over an immutable source buffer.
//!
//! Passes record `(start, end, replacement, priority, tag)` intents against
//! the buffer they scanned; nothing moves until [`EditBuffer::apply`], so
//! every recorded offset stays valid while later passes scan the same text.
//! Application walks edits in descending start order; within one start,
//! higher priority lands earlier in the output, then lower tag. Overlaps
//! between different priorities resolve in favour of the higher priority;
//! same-priority overlaps are a hard error.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("overlapping edits at byte {at}: tag {a} vs tag {b} (same priority {priority})")]
    Overlap { at: usize, a: u32, b: u32, priority: i32 },
    #[error("edit range {start}..{end} (tag {tag}) exceeds source length {len}")]
    OutOfBounds { start: usize, end: usize, tag: u32, len: usize },
}

#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
    priority: i32,
    tag: u32,
}

#[derive(Debug, Default)]
pub struct EditBuffer {
    edits: Vec<Edit>,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Record an intent to replace `src[start..end)` with `text`.
    pub fn add(
        &mut self,
        start: usize,
        end: usize,
        text: impl Into<String>,
        priority: i32,
        tag: u32,
    ) {
        debug_assert!(start <= end, "inverted edit range");
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
            priority,
            tag,
        });
    }

    /// Splice all recorded edits into `src`, producing a new string.
    /// Bytes outside edited ranges are preserved exactly.
    pub fn apply(&self, src: &str) -> Result<String, EditError> {
        for e in &self.edits {
            if e.end > src.len() {
                return Err(EditError::OutOfBounds {
                    start: e.start,
                    end: e.end,
                    tag: e.tag,
                    len: src.len(),
                });
            }
        }

        // Resolve conflicts on an ascending sweep: a surviving edit is popped
        // again only when a strictly higher-priority overlapper arrives.
        let mut sorted: Vec<&Edit> = self.edits.iter().collect();
        sorted.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(b.priority.cmp(&a.priority))
                .then(a.tag.cmp(&b.tag))
        });
        let mut kept: Vec<&Edit> = Vec::with_capacity(sorted.len());
        'next: for e in sorted {
            while let Some(last) = kept.last() {
                let overlaps = e.start < last.end && last.start < e.end;
                if !overlaps {
                    break;
                }
                if e.priority > last.priority {
                    kept.pop();
                } else if e.priority < last.priority {
                    continue 'next;
                } else {
                    return Err(EditError::Overlap {
                        at: e.start,
                        a: last.tag,
                        b: e.tag,
                        priority: e.priority,
                    });
                }
            }
            kept.push(e);
        }

        // Apply in descending start order so earlier offsets stay valid.
        // For equal starts (pure insertions) higher priority must end up
        // earlier in the output, so it is spliced last.
        kept.sort_by(|a, b| {
            b.start
                .cmp(&a.start)
                .then(a.priority.cmp(&b.priority))
                .then(b.tag.cmp(&a.tag))
        });
        let mut out = src.to_string();
        for e in kept {
            out.replace_range(e.start..e.end, &e.text);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_single_replacement() {
        let mut eb = EditBuffer::new();
        eb.add(4, 7, "planet", 0, 1);
        assert_eq!(eb.apply("the old world").unwrap(), "the planet world");
    }

    #[test]
    fn apply_descending_keeps_offsets_valid() {
        let src = "aa bb cc";
        let mut eb = EditBuffer::new();
        eb.add(0, 2, "X", 0, 1);
        eb.add(3, 5, "YYYY", 0, 1);
        eb.add(6, 8, "Z", 0, 1);
        assert_eq!(eb.apply(src).unwrap(), "X YYYY Z");
    }

    #[test]
    fn same_priority_overlap_is_error() {
        let mut eb = EditBuffer::new();
        eb.add(0, 4, "a", 1, 1);
        eb.add(2, 6, "b", 1, 2);
        assert!(matches!(
            eb.apply("0123456789"),
            Err(EditError::Overlap { priority: 1, .. })
        ));
    }

    #[test]
    fn higher_priority_suppresses_overlapping_lower() {
        let mut eb = EditBuffer::new();
        eb.add(0, 4, "LOW", 1, 1);
        eb.add(2, 6, "HIGH", 2, 2);
        // Either arrival order resolves the same way.
        assert_eq!(eb.apply("0123456789").unwrap(), "01HIGH6789");

        let mut eb = EditBuffer::new();
        eb.add(2, 6, "HIGH", 2, 2);
        eb.add(0, 4, "LOW", 1, 1);
        assert_eq!(eb.apply("0123456789").unwrap(), "01HIGH6789");
    }

    #[test]
    fn insertions_at_same_point_order_by_priority_then_tag() {
        let mut eb = EditBuffer::new();
        eb.add(3, 3, "<b>", 1, 7);
        eb.add(3, 3, "<a>", 2, 9);
        eb.add(3, 3, "<c>", 1, 8);
        assert_eq!(eb.apply("xyz!").unwrap(), "xyz<a><b><c>!");
    }

    #[test]
    fn out_of_bounds_rejected() {
        let mut eb = EditBuffer::new();
        eb.add(0, 99, "x", 0, 1);
        assert!(matches!(eb.apply("short"), Err(EditError::OutOfBounds { .. })));
    }

    #[test]
    fn empty_buffer_is_identity() {
        let eb = EditBuffer::new();
        assert_eq!(eb.apply("unchanged").unwrap(), "unchanged");
    }
}
