use num_traits::Float;

/// Index of the largest value; NaN values are never selected unless all values are NaN.
pub fn argmax<F: Float>(values: impl IntoIterator<Item = F>) -> Option<usize> {
    values
        .into_iter()
        .enumerate()
        .fold(None, |best: Option<(usize, F)>, (i, v)| match best {
            None => Some((i, v)),
            Some((_, b)) if b.is_nan() && !v.is_nan() => Some((i, v)),
            Some((_, b)) if v > b => Some((i, v)),
            keep => keep,
        })
        .map(|(i, _)| i)
}

/// Numerically stable softmax: `exp(v - max(v)) / Σ exp(v - max(v))`
pub fn softmax<F: Float>(values: &[F]) -> Vec<F> {
    let max = values.iter().fold(F::neg_infinity(), |m, &v| m.max(v));
    let exp: Vec<F> = values.iter().map(|&v| (v - max).exp()).collect();
    let sum = exp.iter().fold(F::zero(), |s, &v| s + v);
    exp.into_iter().map(|v| v / sum).collect()
}

/// Standard deviation relative to the maximum of the values, an indicator of how well
/// the Q-network distinguishes between actions.
pub fn relative_spread<F: Float>(values: &[F]) -> F {
    let n = F::from(values.len()).unwrap_or_else(F::one);
    let mean = values.iter().fold(F::zero(), |s, &v| s + v) / n;
    let var = values.iter().fold(F::zero(), |s, &v| s + (v - mean) * (v - mean)) / n;
    let max = values.iter().fold(F::neg_infinity(), |m, &v| m.max(v));
    var.sqrt() / max.abs()
}
