//! Marker ordering for possibly overlapping comment ranges.
//!
//! Pure: spans in, an ordered list of marker operations out. Ranges open in
//! order of start offset, wider ranges first, identical ranges in input
//! order, and close last-opened-first-closed. A range whose end arrives while
//! a range opened after it is still open stays open until that range closes,
//! so the markers always nest.

use super::CommentError;
use crate::locator::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
}

/// Which side of an offset a marker attaches to when the offset sits
/// between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Right after the last run ending at the offset.
    AfterPreceding,
    /// Right before the first run starting at the offset, or at the end of
    /// the paragraph.
    BeforeFollowing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerOp {
    /// Index of the range in the planner's input.
    pub range: usize,
    pub kind: MarkerKind,
    pub offset: usize,
    pub placement: Placement,
}

/// Open ranges with their effective spans, innermost last.
#[derive(Debug, Default)]
pub struct CommentRangeStack {
    open: Vec<(usize, Span)>,
}

impl CommentRangeStack {
    pub fn push(&mut self, range: usize, span: Span) {
        self.open.push((range, span));
    }

    /// Closes the innermost range if it ends at or before `offset` (always,
    /// when `offset` is `None`). The enclosing range grows to cover it.
    pub fn pop_due(&mut self, offset: Option<usize>) -> Option<(usize, Span)> {
        let &(_, innermost) = self.open.last()?;
        if offset.is_some_and(|offset| innermost.end > offset) {
            return None;
        }
        let closed = self.open.pop()?;
        if let Some((_, outer)) = self.open.last_mut() {
            outer.end = outer.end.max(closed.1.end);
        }
        Some(closed)
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

pub fn plan_markers(spans: &[Span]) -> Vec<MarkerOp> {
    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by(|&a, &b| {
        spans[a]
            .start
            .cmp(&spans[b].start)
            .then(spans[b].end.cmp(&spans[a].end))
            .then(a.cmp(&b))
    });

    let mut ops = Vec::with_capacity(spans.len() * 2);
    let mut stack = CommentRangeStack::default();
    for range in order {
        let span = spans[range];
        close_due(&mut stack, Some(span.start), &mut ops);
        ops.push(MarkerOp {
            range,
            kind: MarkerKind::Start,
            offset: span.start,
            placement: Placement::BeforeFollowing,
        });
        stack.push(range, span);
    }
    close_due(&mut stack, None, &mut ops);
    ops
}

fn close_due(stack: &mut CommentRangeStack, offset: Option<usize>, ops: &mut Vec<MarkerOp>) {
    while let Some((range, span)) = stack.pop_due(offset) {
        let placement = if span.is_empty() {
            Placement::BeforeFollowing
        } else {
            Placement::AfterPreceding
        };
        ops.push(MarkerOp {
            range,
            kind: MarkerKind::End,
            offset: span.end,
            placement,
        });
    }
}

/// Bracket check: every range opens once, closes once, closes only while it
/// is the innermost open range, and offsets never go backwards.
pub fn check_nesting(ops: &[MarkerOp]) -> Result<(), CommentError> {
    let mut stack: Vec<usize> = Vec::new();
    let mut seen: Vec<usize> = Vec::new();
    let mut last_offset = 0;

    for op in ops {
        if op.offset < last_offset {
            return Err(integrity(format!(
                "marker for range {} at {} follows offset {last_offset}",
                op.range, op.offset
            )));
        }
        last_offset = op.offset;
        match op.kind {
            MarkerKind::Start => {
                if seen.contains(&op.range) {
                    return Err(integrity(format!("range {} opened twice", op.range)));
                }
                seen.push(op.range);
                stack.push(op.range);
            }
            MarkerKind::End => match stack.pop() {
                Some(open) if open == op.range => {}
                Some(open) => {
                    return Err(integrity(format!(
                        "range {} closed while range {open} is open inside it",
                        op.range
                    )));
                }
                None => {
                    return Err(integrity(format!(
                        "range {} closed before it was opened",
                        op.range
                    )));
                }
            },
        }
    }
    match stack.last() {
        Some(open) => Err(integrity(format!("range {open} never closed"))),
        None => Ok(()),
    }
}

fn integrity(reason: String) -> CommentError {
    CommentError::OverlapIntegrity { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn render(ops: &[MarkerOp]) -> String {
        ops.iter()
            .map(|op| match op.kind {
                MarkerKind::Start => format!("S{}", op.range),
                MarkerKind::End => format!("E{}", op.range),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn spans(pairs: &[(usize, usize)]) -> Vec<Span> {
        pairs.iter().map(|&(start, end)| Span::new(start, end)).collect()
    }

    #[test]
    fn test_inner_range_nests_inside_outer() {
        // Given "abcdefghij" with comments on [0,10) and [3,6)
        let ops = plan_markers(&spans(&[(0, 10), (3, 6)]));

        // Then the second nests entirely inside the first
        insta::assert_snapshot!(render(&ops), @"S0 S1 E1 E0");
        let offsets: Vec<usize> = ops.iter().map(|op| op.offset).collect();
        assert_eq!(offsets, vec![0, 3, 6, 10]);
    }

    #[test]
    fn test_outermost_opens_first_regardless_of_input_order() {
        let ops = plan_markers(&spans(&[(3, 6), (0, 10)]));
        insta::assert_snapshot!(render(&ops), @"S1 S0 E0 E1");
    }

    #[test]
    fn test_partial_overlap_extends_the_earlier_range() {
        let ops = plan_markers(&spans(&[(0, 5), (3, 8)]));
        insta::assert_snapshot!(render(&ops), @"S0 S1 E1 E0");
        let end_of_first = ops
            .iter()
            .find(|op| op.range == 0 && op.kind == MarkerKind::End)
            .unwrap();
        assert_eq!(end_of_first.offset, 8);
    }

    #[test]
    fn test_identical_ranges_nest_in_input_order() {
        let ops = plan_markers(&spans(&[(2, 5), (2, 5)]));
        insta::assert_snapshot!(render(&ops), @"S0 S1 E1 E0");
    }

    #[test]
    fn test_adjacent_ranges_do_not_nest() {
        let ops = plan_markers(&spans(&[(0, 3), (3, 6)]));
        insta::assert_snapshot!(render(&ops), @"S0 E0 S1 E1");
        assert_eq!(ops[1].placement, Placement::AfterPreceding);
        assert_eq!(ops[2].placement, Placement::BeforeFollowing);
    }

    #[test]
    fn test_collapsed_range_attaches_to_following_run() {
        let ops = plan_markers(&spans(&[(0, 10), (4, 4)]));
        insta::assert_snapshot!(render(&ops), @"S0 S1 E1 E0");
        assert!(
            ops.iter()
                .filter(|op| op.range == 1)
                .all(|op| op.placement == Placement::BeforeFollowing)
        );
    }

    #[rstest]
    #[case(&[])]
    #[case(&[(0, 4)])]
    #[case(&[(0, 10), (3, 6), (3, 6), (5, 12), (12, 12), (11, 20)])]
    #[case(&[(5, 9), (0, 6), (8, 10), (1, 2), (2, 9)])]
    #[case(&[(4, 4), (4, 4), (0, 4), (4, 8)])]
    fn test_plans_always_nest(#[case] pairs: &[(usize, usize)]) {
        let ops = plan_markers(&spans(pairs));
        assert_eq!(ops.len(), pairs.len() * 2);
        check_nesting(&ops).unwrap();
    }

    #[test]
    fn test_check_nesting_rejects_crossing_markers() {
        let start = |range, offset| MarkerOp {
            range,
            kind: MarkerKind::Start,
            offset,
            placement: Placement::BeforeFollowing,
        };
        let end = |range, offset| MarkerOp {
            range,
            kind: MarkerKind::End,
            offset,
            placement: Placement::AfterPreceding,
        };
        let crossing = [start(0, 0), start(1, 3), end(0, 5), end(1, 8)];
        assert!(matches!(
            check_nesting(&crossing),
            Err(CommentError::OverlapIntegrity { .. })
        ));
        let unopened = [end(0, 5)];
        assert!(check_nesting(&unopened).is_err());
        let unclosed = [start(0, 0)];
        assert!(check_nesting(&unclosed).is_err());
    }

    #[test]
    fn test_range_stack_defers_outer_close() {
        let mut stack = CommentRangeStack::default();
        stack.push(0, Span::new(0, 5));
        stack.push(1, Span::new(3, 8));
        assert_eq!(stack.pop_due(Some(6)), None);
        assert_eq!(stack.pop_due(None), Some((1, Span::new(3, 8))));
        assert_eq!(stack.pop_due(None), Some((0, Span::new(0, 8))));
        assert!(stack.is_empty());
    }
}
