/// A level change on the bus line, as seen by the edge capture timer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Level after the edge
    pub active: bool,
    /// Capture ticks spent at the previous level
    pub elapsed: u32,
}

/// Convert half bit line levels into edges. The line is idle (inactive)
/// before the first level. `jitter` is added to the duration of every edge.
pub fn edges_from_levels(
    levels: &[bool],
    half_bit: u32,
    mut jitter: impl FnMut() -> i32,
) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut level = false;
    let mut run = 0u32;
    for &l in levels {
        if l != level {
            let elapsed = (run as i64 + jitter() as i64).max(1) as u32;
            edges.push(Edge { active: l, elapsed });
            level = l;
            run = 0;
        }
        run += half_bit;
    }
    edges
}

#[test]
fn edges_of_backward_frame() {
    let levels = [true, false, true, false, false, true, false, false];
    let edges = edges_from_levels(&levels, 100, || 0);
    assert_eq!(
        edges,
        vec![
            Edge { active: true, elapsed: 1 },
            Edge { active: false, elapsed: 100 },
            Edge { active: true, elapsed: 100 },
            Edge { active: false, elapsed: 100 },
            Edge { active: true, elapsed: 200 },
            Edge { active: false, elapsed: 100 },
        ]
    );
}
