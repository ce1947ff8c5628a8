use crate::criteria::{CommentCriteria, PostCriteria};
use crate::discord::render_digest;
use crate::notifier::{Digest, Notifier};
use crate::ranking::{rank_and_truncate, select_opportunities};
use chrono::{DateTime, Duration, Utc};
use database::DedupStore;
use llm_interface::OpportunityScorer;
use reddit_client::{
    CommentFilter, CommentHarvester, CommentTreeFlattener, FetchStrategy, JsonFetcher, MergeReport,
    MultiStrategyMerger, RedditEndpoints,
};
use scout_core::{CoreError, ErrorExt, Item, Post, ScoredItem, ScoutConfig};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryOutcome {
    /// Both item classes came out empty; the notifier was not called.
    #[default]
    NothingToSend,
    Delivered,
    /// The digest was rendered to the log instead of being sent.
    DryRun,
    Failed,
}

/// Cardinality of every stage of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub pruned: u64,
    pub fetched: usize,
    pub after_dedup: usize,
    pub after_criteria: usize,
    pub comments_fetched: usize,
    pub comments_kept: usize,
    pub posts_scored: usize,
    pub comments_scored: usize,
    pub posts_selected: usize,
    pub comments_selected: usize,
    pub delivery: DeliveryOutcome,
    pub marked_seen: usize,
    pub stored_total: u64,
    pub merge_reports: Vec<MergeReport>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pruned {}, fetched {}, new {}, matching {}, comments {}/{}, scored {}+{}, selected {}+{}, delivery {:?}, marked {}, stored {}",
            self.pruned,
            self.fetched,
            self.after_dedup,
            self.after_criteria,
            self.comments_kept,
            self.comments_fetched,
            self.posts_scored,
            self.comments_scored,
            self.posts_selected,
            self.comments_selected,
            self.delivery,
            self.marked_seen,
            self.stored_total
        )
    }
}

/// Runs one scouting cycle: prune, fetch and merge, dedup, filter, score,
/// rank, deliver, mark seen.
pub struct ScoutService {
    sources: Vec<String>,
    merger: MultiStrategyMerger,
    harvester: CommentHarvester,
    store: DedupStore,
    scorer: Arc<dyn OpportunityScorer>,
    notifier: Arc<dyn Notifier>,
    post_criteria: PostCriteria,
    comment_criteria: CommentCriteria,
    ttl: Duration,
    top_n: usize,
    min_opportunity_score: f64,
    dry_run: bool,
}

impl ScoutService {
    pub fn new(
        config: &ScoutConfig,
        fetcher: Arc<dyn JsonFetcher>,
        store: DedupStore,
        scorer: Arc<dyn OpportunityScorer>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, CoreError> {
        let endpoints = RedditEndpoints::new(&config.reddit.base_url)?;

        let merger = MultiStrategyMerger::new(
            Arc::clone(&fetcher),
            endpoints.clone(),
            FetchStrategy::default_set(config.reddit.time_filter),
            config.reddit.per_strategy_limit(),
        );
        let harvester = CommentHarvester::new(
            fetcher,
            endpoints,
            CommentTreeFlattener::new(CommentFilter::new(config.filters.min_comment_score)),
            config.reddit.comment_limit,
        );

        Ok(Self {
            sources: config.reddit.subreddits.clone(),
            merger,
            harvester,
            store,
            scorer,
            notifier,
            post_criteria: PostCriteria::from_config(&config.filters),
            comment_criteria: CommentCriteria::from_config(&config.filters),
            ttl: config.database.ttl(),
            top_n: config.output.top_n,
            min_opportunity_score: config.output.min_opportunity_score,
            dry_run: false,
        })
    }

    /// Run every stage but skip delivery and mark-as-seen.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// Store failures abort the run. Fetch failures are logged and skipped;
    /// scoring and delivery failures are skipped too unless
    /// [`ErrorExt::is_fatal`] says otherwise.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunSummary, CoreError> {
        let mut summary = RunSummary {
            pruned: self.store.prune(self.ttl, now).await?,
            ..RunSummary::default()
        };
        info!("Pruned {} records older than {} days", summary.pruned, self.ttl.num_days());

        // Fetch and merge
        let batches = self.merger.merge_sources(&self.sources).await;
        let mut posts: Vec<Post> = Vec::new();
        for batch in batches {
            summary.merge_reports.push(batch.report);
            posts.extend(batch.posts);
        }
        summary.fetched = posts.len();
        info!("Fetched {} posts", summary.fetched);

        // Dedup filter
        let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let seen = self.store.contains_any(&ids).await?;
        posts.retain(|p| !seen.contains(&p.id));
        summary.after_dedup = posts.len();
        info!("After dedup filter: {} posts", summary.after_dedup);

        // Criteria
        posts.retain(|p| self.post_criteria.accepts(p));
        summary.after_criteria = posts.len();
        info!("After criteria filter: {} posts", summary.after_criteria);

        let mut comments = if posts.is_empty() {
            Vec::new()
        } else {
            self.harvester.harvest(&posts).await
        };
        summary.comments_fetched = comments.len();
        comments.retain(|c| self.comment_criteria.accepts(c));
        summary.comments_kept = comments.len();
        info!(
            "Comments: {} fetched, {} after criteria filter",
            summary.comments_fetched, summary.comments_kept
        );

        // Scoring and ranking
        let scored_posts = self.score_all(posts, now).await?;
        summary.posts_scored = scored_posts.len();
        let top_posts = rank_and_truncate(
            select_opportunities(scored_posts, self.min_opportunity_score),
            self.top_n,
        );
        summary.posts_selected = top_posts.len();

        let scored_comments = self.score_all(comments, now).await?;
        summary.comments_scored = scored_comments.len();
        let top_comments = rank_and_truncate(
            select_opportunities(scored_comments, self.min_opportunity_score),
            self.top_n,
        );
        summary.comments_selected = top_comments.len();
        info!(
            "Selected top {} posts and {} comments",
            summary.posts_selected, summary.comments_selected
        );

        let digest = Digest {
            posts: top_posts,
            comments: top_comments,
            generated_at: now,
        };

        summary.delivery = self.deliver(&digest).await?;

        if summary.delivery == DeliveryOutcome::Delivered {
            let delivered = delivered_post_ids(&digest);
            if !delivered.is_empty() {
                self.store.mark_seen(&delivered, now).await?;
                summary.marked_seen = delivered.len();
            }
        }

        summary.stored_total = self.store.stats().await?.total_count;
        info!("Run summary: {}", summary);
        Ok(summary)
    }

    async fn score_all<T>(
        &self,
        items: Vec<T>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredItem<T>>, CoreError>
    where
        T: Clone + Into<Item> + Send,
    {
        let total = items.len();
        let mut scored = Vec::with_capacity(total);

        for item in items {
            let candidate: Item = item.clone().into();
            match self.scorer.score(&candidate, now).await {
                Ok(analysis) => {
                    debug!("Item {} scored {:.1}", candidate.id(), analysis.score);
                    scored.push(ScoredItem::new(item, analysis));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Scoring failed for item {}", candidate.id());
                    e.log_warn();
                }
            }
        }

        if total > 0 {
            info!("Scored {}/{} items", scored.len(), total);
        }
        Ok(scored)
    }

    async fn deliver(&self, digest: &Digest) -> Result<DeliveryOutcome, CoreError> {
        if digest.is_empty() {
            info!("No new opportunities to push");
            return Ok(DeliveryOutcome::NothingToSend);
        }

        if self.dry_run {
            info!("Dry run, digest not sent:\n{}", render_digest(digest));
            return Ok(DeliveryOutcome::DryRun);
        }

        match self.notifier.deliver(digest).await {
            Ok(()) => {
                info!(
                    "Sent: {} posts, {} comments",
                    digest.posts.len(),
                    digest.comments.len()
                );
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                e.log_error();
                Ok(DeliveryOutcome::Failed)
            }
        }
    }
}

/// Store keys for a delivered digest. The store is keyed on post ids, so a
/// delivered comment is recorded through the post it was harvested from;
/// otherwise it would come back every run while that post stays listed.
fn delivered_post_ids(digest: &Digest) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let posts = digest.posts.iter().map(|s| &s.item.id);
    let parents = digest.comments.iter().map(|s| &s.item.source_item_id);
    for id in posts.chain(parents) {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}
