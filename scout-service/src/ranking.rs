use scout_core::ScoredItem;

/// Drops items scored below `min_score`.
pub fn select_opportunities<T>(scored: Vec<ScoredItem<T>>, min_score: f64) -> Vec<ScoredItem<T>> {
    scored
        .into_iter()
        .filter(|item| item.score() >= min_score)
        .collect()
}

/// Highest score first; ties keep their input order. Keeps at most `top_n`.
pub fn rank_and_truncate<T>(mut scored: Vec<ScoredItem<T>>, top_n: usize) -> Vec<ScoredItem<T>> {
    scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
    scored.truncate(top_n);
    scored
}
