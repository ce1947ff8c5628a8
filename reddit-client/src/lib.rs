pub mod api;
pub mod comment_tree;
pub mod merger;
pub mod metrics;
pub mod parser;
pub mod rate_limiter;


pub use api::{JsonFetcher, RedditApiClient, RedditEndpoints};
pub use comment_tree::{CommentFilter, CommentHarvester, CommentTreeFlattener};
pub use merger::{FetchStrategy, MergeReport, MultiStrategyMerger, SourceBatch, StrategyYield};
pub use metrics::{ApiMetrics, MetricsCollector};
pub use parser::{parse_comment_root, parse_posts, ParseError};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
