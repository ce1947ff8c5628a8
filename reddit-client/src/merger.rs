use crate::api::{JsonFetcher, RedditEndpoints};
use crate::parser;
use futures::future::join_all;
use scout_core::{ErrorExt, Post, TimeFilter};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// One sort order used to sample a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStrategy {
    Hot,
    Rising,
    Top(TimeFilter),
    New,
}

impl FetchStrategy {
    /// The declared order; later strategies win field conflicts.
    pub fn default_set(time_filter: TimeFilter) -> Vec<Self> {
        vec![
            FetchStrategy::Hot,
            FetchStrategy::Rising,
            FetchStrategy::Top(time_filter),
            FetchStrategy::New,
        ]
    }

    pub fn path(&self) -> &'static str {
        match self {
            FetchStrategy::Hot => "hot",
            FetchStrategy::Rising => "rising",
            FetchStrategy::Top(_) => "top",
            FetchStrategy::New => "new",
        }
    }

    pub fn time_filter(&self) -> Option<TimeFilter> {
        match self {
            FetchStrategy::Top(window) => Some(*window),
            _ => None,
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyYield {
    pub strategy: FetchStrategy,
    /// False when the fetch came back empty-handed.
    pub fetched: bool,
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub source: String,
    pub yields: Vec<StrategyYield>,
    pub unique_items: usize,
}

impl MergeReport {
    pub fn yield_for(&self, strategy: FetchStrategy) -> Option<&StrategyYield> {
        self.yields.iter().find(|y| y.strategy == strategy)
    }

    pub fn failed_strategies(&self) -> usize {
        self.yields.iter().filter(|y| !y.fetched).count()
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r/{}: {} unique posts (", self.source, self.unique_items)?;
        for (i, y) in self.yields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if y.fetched {
                write!(f, "{}:{}", y.strategy, y.items)?;
            } else {
                write!(f, "{}:failed", y.strategy)?;
            }
        }
        f.write_str(")")
    }
}

/// Deduplicated posts for one source, in first-seen order.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: String,
    pub posts: Vec<Post>,
    pub report: MergeReport,
}

/// Collapses per-strategy results into one record per id.
///
/// `results` must be in declared strategy order: when an id repeats, the later
/// record replaces the earlier one but keeps its original position. `None`
/// marks a strategy whose fetch failed.
pub fn merge_strategy_results(
    source: &str,
    results: Vec<(FetchStrategy, Option<Vec<Post>>)>,
) -> SourceBatch {
    let mut posts: Vec<Post> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut yields = Vec::with_capacity(results.len());

    for (strategy, fetched) in results {
        let fetched_ok = fetched.is_some();
        let strategy_posts = fetched.unwrap_or_default();
        yields.push(StrategyYield {
            strategy,
            fetched: fetched_ok,
            items: strategy_posts.len(),
        });

        for post in strategy_posts {
            match index.get(&post.id) {
                Some(&slot) => posts[slot] = post,
                None => {
                    index.insert(post.id.clone(), posts.len());
                    posts.push(post);
                }
            }
        }
    }

    SourceBatch {
        source: source.to_string(),
        report: MergeReport {
            source: source.to_string(),
            yields,
            unique_items: posts.len(),
        },
        posts,
    }
}

/// Samples each source with several sort strategies and merges the results.
pub struct MultiStrategyMerger {
    fetcher: Arc<dyn JsonFetcher>,
    endpoints: RedditEndpoints,
    strategies: Vec<FetchStrategy>,
    per_strategy_limit: u32,
}

impl MultiStrategyMerger {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        endpoints: RedditEndpoints,
        strategies: Vec<FetchStrategy>,
        per_strategy_limit: u32,
    ) -> Self {
        Self {
            fetcher,
            endpoints,
            strategies,
            per_strategy_limit,
        }
    }

    pub fn strategies(&self) -> &[FetchStrategy] {
        &self.strategies
    }

    /// Fetches every strategy for `source`. The fetches run concurrently but
    /// share the fetcher's throttle, and `join_all` hands results back in
    /// declared order so the merge stays deterministic.
    pub async fn merge_source(&self, source: &str) -> SourceBatch {
        let fetches = self.strategies.iter().map(|&strategy| async move {
            let url = match self
                .endpoints
                .listing(source, strategy, self.per_strategy_limit)
            {
                Ok(url) => url,
                Err(e) => {
                    e.log_warn();
                    return (strategy, None);
                }
            };

            match self.fetcher.fetch_json(&url).await {
                Some(payload) => (strategy, Some(parser::parse_posts(&payload, source))),
                None => {
                    warn!("r/{}: {} strategy returned no data", source, strategy);
                    (strategy, None)
                }
            }
        });

        let results = join_all(fetches).await;
        let batch = merge_strategy_results(source, results);
        info!("{}", batch.report);
        batch
    }

    /// Runs [`merge_source`](Self::merge_source) for each source in turn. Ids
    /// are only merged within a source, never across sources.
    pub async fn merge_sources(&self, sources: &[String]) -> Vec<SourceBatch> {
        let mut batches = Vec::with_capacity(sources.len());
        for source in sources {
            batches.push(self.merge_source(source).await);
        }

        let total: usize = batches.iter().map(|b| b.posts.len()).sum();
        info!("Total posts fetched: {}", total);
        batches
    }
}
