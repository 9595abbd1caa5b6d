use ndarray::{ArrayView1, ArrayView2, Axis};

/// Index of the largest score in every row of a `[T, C]` view. Ties go to the
/// lowest index.
pub fn argmax_in_axis1(scores: ArrayView2<f32>) -> Vec<usize> {
    scores.axis_iter(Axis(0)).map(argmax).collect()
}

pub fn argmax(row: ArrayView1<f32>) -> usize {
    let mut index = 0;
    let mut max = f32::NEG_INFINITY;
    for (i, v) in row.iter().enumerate() {
        if *v > max {
            max = *v;
            index = i;
        }
    }
    index
}

/// Largest softmax probability of one row, computed without forming the full
/// distribution: `exp(max - max) / sum(exp(v - max))`.
pub fn softmax_max(row: ArrayView1<f32>) -> f32 {
    let max = row.fold(f32::NEG_INFINITY, |m, v| m.max(*v));
    if max == f32::INFINITY {
        // the infinite logits share all of the mass
        let top = row.iter().filter(|v| **v == f32::INFINITY).count();
        return 1.0 / top as f32;
    }
    if !max.is_finite() {
        return 0.0;
    }
    let sum: f32 = row.iter().map(|v| (v - max).exp()).sum();
    if sum > 0.0 {
        (1.0 / sum).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
