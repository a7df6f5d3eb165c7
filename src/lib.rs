// Parliament Graph - Core Library
// Ingests legislators from several public sources, reconciles them, and
// upserts them into a property graph. Used by the CLI and tests.

pub mod aliases;
pub mod config;
pub mod connectors;
pub mod error;
pub mod graph;
pub mod http;
pub mod legislator;
pub mod mappings;
pub mod pipeline;
pub mod reconciler;
pub mod snapshot;
pub mod votes;
pub mod writer;

// Re-export commonly used types
pub use aliases::PartyAliases;
pub use config::{PipelineConfig, SourceUrls};
pub use connectors::{
    ElectionResultClient, ElectionStatsSource, GovernmentPostsClient, MemberListing, MembersPaginator, NationTables,
    RegionTableScraper, RejectedMember, SecondaryApiClient, VotePageScraper, VoteSource,
};
pub use error::{MappingKind, PipelineError, Result};
pub use graph::{
    CypherScript, GraphStat, GraphStore, NodeRef, Properties, SqliteGraphStore, StatKind, UpsertEvent,
};
pub use http::{fetch_with_retry, HttpFetch, HttpResponse, ReqwestFetcher, RetryPolicy, Throttled};
pub use legislator::{ElectionStats, Legislator, LegislatorBuilder, MemberFragment, VotesStatus};
pub use mappings::{ConstituencyKey, GovernmentPosts, RegionMap, SecondaryIdentity, SecondaryIdentityMap};
pub use pipeline::{import_legislators, import_snapshot, Pipeline, RecordFailure, RunOutput, RunReport};
pub use reconciler::{Reconciler, SourceMaps, VoteFailurePolicy};
pub use snapshot::{RejectedRecord, SnapshotLoad};
pub use votes::{parse_vote_text, VoteDirection, VoteRecord, VoteTally};
pub use writer::{GraphWriter, UpsertSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
