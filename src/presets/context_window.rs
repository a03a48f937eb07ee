//! Context-window sizing for segmented video sampling.
//!
//! Video models want windows of `4n + 1` frames. Given a clip length and a
//! window range, pick the window that wastes the fewest padded frames.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub window: u32,
    pub padding: u32,
    pub padded_total: u32,
    pub segments: u32,
}

fn plan_for(total: u32, window: u32) -> WindowPlan {
    let segments = (total + window - 1) / window;
    let padded_total = segments * window;
    WindowPlan {
        window,
        padding: padded_total - total,
        padded_total,
        segments,
    }
}

/// Best `4n + 1` window within `[min_window, max_window]`. Ties go to the
/// larger window. Out-of-range arguments are clamped first.
pub fn best_window(total: i64, min_window: i64, max_window: i64) -> WindowPlan {
    let total = total.clamp(0, u32::MAX as i64 / 2) as u32;
    let min_w = min_window.clamp(1, u32::MAX as i64 / 4) as u32;
    let max_w = (max_window.clamp(1, u32::MAX as i64 / 4) as u32).max(min_w);

    let first = min_w + (5 - min_w % 4) % 4;
    if first > max_w {
        return plan_for(total, (max_w - (max_w - 1) % 4).max(1));
    }

    (first..=max_w)
        .step_by(4)
        .map(|w| plan_for(total, w))
        .fold(None, |best: Option<WindowPlan>, p| match best {
            Some(b) if b.padding < p.padding || (b.padding == p.padding && b.window > p.window) => Some(b),
            _ => Some(p),
        })
        .unwrap_or_else(|| plan_for(total, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_hundred_frames() {
        // 61:44 65:60 69:7 73:19 77:31 81:43
        let plan = best_window(200, 61, 81);
        assert_eq!(plan, WindowPlan { window: 69, padding: 7, padded_total: 207, segments: 3 });
    }

    #[test]
    fn test_tie_prefers_larger() {
        // every candidate divides 0 frames evenly
        assert_eq!(best_window(0, 1, 9).window, 9);
        assert_eq!(best_window(0, 1, 9).segments, 0);
    }

    #[test]
    fn test_no_candidate_falls_back() {
        // [6, 8] has no 4n+1; largest admissible below 8 is 5
        let plan = best_window(10, 6, 8);
        assert_eq!(plan.window, 5);
        assert_eq!(plan.segments, 2);
        assert_eq!(plan.padding, 0);
    }

    #[test]
    fn test_first_candidate_alignment() {
        assert_eq!(best_window(10, 2, 5).window, 5);
        assert_eq!(best_window(9, 9, 9).window, 9);
        assert_eq!(best_window(13, 10, 13).window, 13);
    }

    #[test]
    fn test_huge_window_range_without_candidate_list() {
        let plan = best_window(200, 200, i64::MAX);
        assert_eq!(plan.window, 201);
        assert_eq!(plan.padding, 1);
        assert_eq!(plan.segments, 1);
    }

    #[test]
    fn test_sanitizes_inputs() {
        let plan = best_window(-5, 0, -3);
        assert_eq!(plan.window, 1);
        assert_eq!(plan.padding, 0);
    }

    proptest! {
        #[test]
        fn prop_plan_is_consistent(total in 0i64..5000, min_w in 1i64..200, span in 0i64..200) {
            let plan = best_window(total, min_w, min_w + span);
            prop_assert_eq!(plan.window % 4, 1);
            prop_assert_eq!(plan.padded_total, plan.segments * plan.window);
            prop_assert!(plan.padded_total >= total as u32);
            prop_assert!(plan.padding < plan.window);
            prop_assert_eq!(plan.padding, plan.padded_total - total as u32);
        }

        #[test]
        fn prop_no_better_candidate(total in 1i64..3000, min_w in 1i64..120, span in 4i64..120) {
            let plan = best_window(total, min_w, min_w + span);
            for w in (min_w..=min_w + span).filter(|w| w % 4 == 1) {
                let k = (total + w - 1) / w;
                let pad = (k * w - total) as u32;
                prop_assert!(pad > plan.padding || (pad == plan.padding && w as u32 <= plan.window));
            }
        }
    }
}
