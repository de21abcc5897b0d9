use std::cmp::Ordering;

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

pub fn l2_norm(v: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for x in v {
        sum += x * x;
    }
    sum.sqrt()
}

/// Indices of the `k` highest scores, highest first.
///
/// The sort is stable, so equal scores keep ascending row order. O(N log N) after the
/// O(N·D) scoring pass.
pub fn rank_top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| descending(scores[a], scores[b]));
    order.truncate(k);
    order
}

fn descending(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_and_norm() {
        assert_eq!(dot(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(l2_norm(&[3.0, 4.0]), 5.0);
    }

    #[test]
    fn ties_keep_row_order() {
        assert_eq!(rank_top_k(&[0.5, 0.9, 0.5, 0.9], 4), vec![1, 3, 0, 2]);
    }

    #[test]
    fn k_larger_than_rows_returns_all() {
        assert_eq!(rank_top_k(&[0.1, 0.2], 10), vec![1, 0]);
        assert!(rank_top_k(&[], 3).is_empty());
    }
}
