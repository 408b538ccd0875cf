use crate::tfidf::SparseVector;

/// Greedy Maximal Marginal Relevance.
///
/// Picks up to `k` indices, each maximizing
/// `lambda * relevance[i] - (1 - lambda) * max(similarity(i, s) for s selected)`.
/// The first pick is the most relevant item. Ties go to the lowest index.
pub fn select<F>(relevance: &[f64], similarity: F, lambda: f64, k: usize) -> Vec<usize>
where
    F: Fn(usize, usize) -> f64,
{
    let n = relevance.len();
    let mut selected = Vec::with_capacity(k.min(n));
    let mut remaining: Vec<bool> = vec![true; n];
    let mut redundancy = vec![f64::NEG_INFINITY; n];

    while selected.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for i in (0..n).filter(|&i| remaining[i]) {
            let score = if selected.is_empty() {
                relevance[i]
            } else {
                lambda * relevance[i] - (1.0 - lambda) * redundancy[i]
            };
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((i, score));
            }
        }
        let Some((pick, _)) = best else {
            break;
        };

        remaining[pick] = false;
        selected.push(pick);
        for i in (0..n).filter(|&i| remaining[i]) {
            redundancy[i] = redundancy[i].max(similarity(i, pick));
        }
    }
    selected
}

/// MMR over TF-IDF rows against a query vector (all L2-normalized)
pub fn select_vectors(
    query: &SparseVector,
    candidates: &[SparseVector],
    lambda: f64,
    k: usize,
) -> Vec<usize> {
    let relevance: Vec<f64> = candidates.iter().map(|c| c.dot(query)).collect();
    select(&relevance, |a, b| candidates[a].dot(&candidates[b]), lambda, k)
}
