pub mod criteria;
pub mod discord;
pub mod notifier;
pub mod pipeline;
pub mod ranking;


pub use criteria::{CommentCriteria, PostCriteria};
pub use discord::{render_digest, split_message, DiscordNotifier};
pub use notifier::{Digest, Notifier};
pub use pipeline::{DeliveryOutcome, RunSummary, ScoutService};
pub use ranking::{rank_and_truncate, select_opportunities};
