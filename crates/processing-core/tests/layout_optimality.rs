use overlaycut_processing_core::layout;
use overlaycut_project_model::layer::{Layer, TextStyle, Timing};
use proptest::prelude::*;

fn layers_from(intervals: &[(u32, u32)]) -> Vec<Layer> {
    intervals
        .iter()
        .map(|&(start, len)| {
            let start = start as f64 * 0.5;
            let end = start + len as f64 * 0.5;
            Layer::text(
                "p",
                TextStyle::default(),
                0.0,
                0.0,
                Timing::new(start, end).unwrap(),
            )
        })
        .collect()
}

fn overlaps(a: &Timing, b: &Timing) -> bool {
    a.start < b.end && b.start < a.end
}

/// Smallest k such that some assignment of layers to k rows has no
/// overlap within a row, found by exhaustive enumeration.
fn brute_force_min_rows(layers: &[Layer]) -> usize {
    let n = layers.len();
    if n == 0 {
        return 0;
    }
    for k in 1..=n {
        let mut assignment = vec![0usize; n];
        loop {
            let valid = (0..n).all(|i| {
                (i + 1..n).all(|j| {
                    assignment[i] != assignment[j]
                        || !overlaps(&layers[i].timing, &layers[j].timing)
                })
            });
            if valid {
                return k;
            }
            // Advance the base-k counter.
            let mut idx = 0;
            while idx < n {
                assignment[idx] += 1;
                if assignment[idx] < k {
                    break;
                }
                assignment[idx] = 0;
                idx += 1;
            }
            if idx == n {
                break;
            }
        }
    }
    n
}

proptest! {
    #[test]
    fn row_count_matches_brute_force_minimum(
        intervals in prop::collection::vec((0u32..12, 1u32..6), 0..7)
    ) {
        let layers = layers_from(&intervals);
        let result = layout(&layers, 100.0);
        prop_assert_eq!(result.row_count(), brute_force_min_rows(&layers));
    }

    #[test]
    fn rows_never_contain_overlaps(
        intervals in prop::collection::vec((0u32..20, 1u32..8), 0..24)
    ) {
        let layers = layers_from(&intervals);
        let result = layout(&layers, 100.0);

        for layer in &layers {
            prop_assert!(result.row_of(layer.id).is_some());
        }
        for row in result.rows() {
            for pair in row.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }
        }
    }

    #[test]
    fn layer_ending_before_all_others_lands_in_row_zero(
        intervals in prop::collection::vec((4u32..20, 1u32..8), 0..12),
        first_len in 1u32..4,
    ) {
        // All other layers start at >= 2.0s; this one ends at <= 2.0s.
        let mut layers = layers_from(&intervals);
        let early = Layer::text(
            "early",
            TextStyle::default(),
            0.0,
            0.0,
            Timing::new(0.0, first_len as f64 * 0.5).unwrap(),
        );
        layers.push(early.clone());

        let result = layout(&layers, 100.0);
        prop_assert_eq!(result.row_of(early.id), Some(0));
    }

    #[test]
    fn layout_is_deterministic(
        intervals in prop::collection::vec((0u32..20, 1u32..8), 0..16)
    ) {
        let layers = layers_from(&intervals);
        prop_assert_eq!(layout(&layers, 100.0), layout(&layers, 100.0));
    }
}
