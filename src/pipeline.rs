// 🚂 Run orchestrator
//
// 1. Upfront sources: secondary identities, regions, government posts, members
// 2. Reconcile members on a bounded worker pool (per-member fetches happen here)
// 3. Write each completed legislator on the calling thread, in arrival order
//
// Per-legislator failures are logged and collected, including members whose
// own record was unreadable. Only a fatal error (members source exhausted)
// stops the run.

use crate::aliases::PartyAliases;
use crate::config::PipelineConfig;
use crate::connectors::{
    ElectionResultClient, GovernmentPostsClient, MemberListing, MembersPaginator, RegionTableScraper,
    SecondaryApiClient, VotePageScraper,
};
use crate::error::{PipelineError, Result};
use crate::graph::GraphStore;
use crate::http::HttpFetch;
use crate::legislator::{Legislator, MemberFragment};
use crate::mappings::ConstituencyKey;
use crate::reconciler::{Reconciler, SourceMaps, VoteFailurePolicy};
use crate::snapshot::SnapshotLoad;
use crate::writer::GraphWriter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================================
// RUN REPORT
// ============================================================================

/// One legislator that was not persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub constituency: String,
    pub code: String,
    pub message: String,
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub persisted: usize,
    /// Persisted with an incomplete vote record
    pub flagged: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub failures: Vec<RecordFailure>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        RunReport {
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            total: 0,
            persisted: 0,
            flagged: 0,
            nodes_written: 0,
            edges_written: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, constituency: &str, err: &PipelineError) {
        let critical = err.is_critical();
        if critical {
            error!(constituency, code = err.code(), error = %err, "legislator skipped (critical)");
        } else {
            warn!(constituency, code = err.code(), error = %err, "legislator skipped");
        }

        self.failures.push(RecordFailure {
            constituency: constituency.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
            critical,
        });
    }

    pub fn critical_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.critical).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.flagged == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Run {}: {} of {} legislators persisted ({} flagged incomplete), {} failed ({} critical), {} node and {} edge upserts",
            self.run_id,
            self.persisted,
            self.total,
            self.flagged,
            self.failures.len(),
            self.critical_failures(),
            self.nodes_written,
            self.edges_written
        )
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// Report plus every legislator that was written
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: RunReport,
    pub legislators: Vec<Legislator>,
}

fn persist<S: GraphStore + ?Sized>(
    writer: &GraphWriter<'_, S>,
    legislator: Legislator,
    report: &mut RunReport,
    written: &mut Vec<Legislator>,
) {
    match writer.upsert(&legislator) {
        Ok(summary) => {
            debug!(legislator = %legislator.describe(), "persisted");
            report.persisted += 1;
            report.nodes_written += summary.nodes;
            report.edges_written += summary.edges;
            if !legislator.votes_complete() {
                report.flagged += 1;
            }
            written.push(legislator);
        }
        Err(err) => report.record_failure(legislator.constituency().as_str(), &err),
    }
}

/// Upsert already-reconciled legislators (snapshot imports, script rendering)
pub fn import_legislators<S: GraphStore + ?Sized>(store: &S, legislators: &[Legislator]) -> RunReport {
    let mut report = RunReport::new(Uuid::new_v4().to_string());
    let writer = GraphWriter::new(store, &report.run_id);
    let mut written = Vec::with_capacity(legislators.len());

    report.total = legislators.len();
    for legislator in legislators {
        persist(&writer, legislator.clone(), &mut report, &mut written);
    }

    report.finish();
    info!("{}", report.summary());
    report
}

/// Upsert a loaded snapshot; records that failed to load count as failures
pub fn import_snapshot<S: GraphStore + ?Sized>(store: &S, snapshot: &SnapshotLoad) -> RunReport {
    let mut report = import_legislators(store, &snapshot.legislators);
    report.total += snapshot.rejected.len();
    for record in &snapshot.rejected {
        report.record_failure(&record.label, &record.error);
    }
    report
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline<'a, F: ?Sized> {
    fetcher: &'a F,
    config: &'a PipelineConfig,
    aliases: PartyAliases,
}

impl<'a, F: HttpFetch + ?Sized> Pipeline<'a, F> {
    pub fn new(fetcher: &'a F, config: &'a PipelineConfig) -> Self {
        Pipeline {
            fetcher,
            config,
            aliases: PartyAliases::default(),
        }
    }

    pub fn with_aliases(mut self, aliases: PartyAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Secondary identities, regions and posts; any failure aborts the run
    pub fn build_source_maps(&self) -> Result<SourceMaps> {
        let sources = &self.config.sources;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Config("secondary API key is not set".to_string()))?;

        let identities = SecondaryApiClient::new(self.fetcher, &sources.secondary, api_key).fetch_identities()?;
        let regions =
            RegionTableScraper::new(self.fetcher, &sources.regions, self.config.nations.clone()).fetch_regions()?;
        let posts = GovernmentPostsClient::new(self.fetcher, &sources.posts).fetch_posts()?;

        info!(
            identities = identities.len(),
            regions = regions.len(),
            posts = posts.len(),
            "source maps built"
        );
        Ok(SourceMaps {
            regions,
            identities,
            posts,
        })
    }

    pub fn fetch_members(&self) -> Result<MemberListing> {
        MembersPaginator::new(self.fetcher, &self.config.sources.members, &self.aliases)
            .with_page_size(self.config.page_size)
            .with_max_page_requests(self.config.max_page_requests)
            .with_retry(self.config.retry_policy())
            .fetch_all()
    }

    pub fn run<S: GraphStore + ?Sized>(&self, store: &S) -> Result<RunOutput> {
        let mut report = RunReport::new(Uuid::new_v4().to_string());
        info!(run_id = %report.run_id, "pipeline run started");

        let maps = self.build_source_maps()?;
        let listing = self.fetch_members()?;
        report.total = listing.seen();
        let MemberListing { members, rejected } = listing;
        for member in &rejected {
            report.record_failure(&member.label(), &member.error);
        }

        let votes = VotePageScraper::new(self.fetcher, &self.config.sources.votes_template);
        let elections = ElectionResultClient::new(self.fetcher, &self.config.sources.election_template);
        let policy = if self.config.strict_votes {
            VoteFailurePolicy::Reject
        } else {
            VoteFailurePolicy::FlagIncomplete
        };
        let reconciler = Reconciler::new(&maps, &votes)
            .with_election_source(&elections)
            .with_vote_failure_policy(policy);

        let writer = GraphWriter::new(store, &report.run_id);
        let mut written = Vec::with_capacity(members.len());
        self.reconcile_and_write(&reconciler, members, &writer, &mut report, &mut written)?;

        report.finish();
        info!("{}", report.summary());
        Ok(RunOutput {
            report,
            legislators: written,
        })
    }

    fn reconcile_and_write<S: GraphStore + ?Sized>(
        &self,
        reconciler: &Reconciler<'_>,
        members: BTreeMap<ConstituencyKey, MemberFragment>,
        writer: &GraphWriter<'_, S>,
        report: &mut RunReport,
        written: &mut Vec<Legislator>,
    ) -> Result<()> {
        let members_len = members.len();
        let workers = self.config.workers.clamp(1, members_len.max(1));
        let abort = AtomicBool::new(false);

        let (job_tx, job_rx) = mpsc::channel::<MemberFragment>();
        for fragment in members.into_values() {
            if job_tx.send(fragment).is_err() {
                break;
            }
        }
        drop(job_tx);
        let job_rx = Mutex::new(job_rx);
        let (result_tx, result_rx) = mpsc::channel::<(ConstituencyKey, Result<Legislator>)>();

        info!(workers, members = members_len, "reconciling members");
        thread::scope(|scope| {
            for worker in 0..workers {
                let result_tx = result_tx.clone();
                let job_rx = &job_rx;
                let abort = &abort;

                scope.spawn(move || {
                    debug!(worker, "reconcile worker started");
                    while !abort.load(Ordering::Relaxed) {
                        let next = match job_rx.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => break,
                        };
                        let Ok(fragment) = next else {
                            break;
                        };

                        let outcome = reconciler.reconcile(&fragment);
                        if result_tx.send((fragment.constituency, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            for (key, outcome) in result_rx.iter() {
                match outcome {
                    Ok(legislator) => persist(writer, legislator, report, written),
                    Err(err) if err.is_fatal() => {
                        abort.store(true, Ordering::Relaxed);
                        error!(constituency = %key, error = %err, "fatal error, aborting run");
                        return Err(err);
                    }
                    Err(err) => report.record_failure(key.as_str(), &err),
                }
            }
            Ok(())
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::NationTables;
    use crate::graph::{CypherScript, SqliteGraphStore};
    use crate::http::testing::ScriptedFetcher;
    use crate::http::HttpResponse;
    use crate::writer::MP_LABEL;

    const MEMBERS: &str = "https://members.example/api/Members/Search";
    const SECONDARY: &str = "https://secondary.example/api/getMPs";
    const REGIONS: &str = "https://wiki.example/Constituencies";
    const POSTS: &str = "https://members.example/api/Posts/GovernmentPosts";

    const VOTE_PAGE: &str = r#"
        <div class="primary-content__unit">
            <div class="panel">
                <h2 id="welfare">Welfare</h2>
                <ul class="vote-descriptions">
                    <li class="vote-description" data-policy-desc="Raising welfare benefits">
                        <a class="vote-description__evidence">300 votes for, 200 votes against</a>
                    </li>
                </ul>
            </div>
        </div>"#;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sources.members = MEMBERS.to_string();
        config.sources.secondary = SECONDARY.to_string();
        config.sources.regions = REGIONS.to_string();
        config.sources.posts = POSTS.to_string();
        config.sources.election_template = "https://members.example/api/Members/{id}/LatestElectionResult".to_string();
        config.sources.votes_template = "https://votes.example/mp/{id}/votes".to_string();
        config.api_key = Some("secret".to_string());
        config.retry_delay_secs = 0;
        config.retry_max_attempts = 3;
        config.workers = 2;
        config.nations = NationTables {
            primary: "England".to_string(),
            others: Vec::new(),
        };
        config
    }

    fn member_json(id: u64, constituency: &str) -> String {
        format!(
            r#"{{"value": {{"id": {id}, "nameDisplayAs": "Member {id}",
                "latestParty": {{"name": "Labour (Co-op)"}},
                "latestHouseMembership": {{"membershipFrom": "{constituency}",
                    "membershipStartDate": "2017-06-08T00:00:00"}},
                "gender": "F"}}}}"#
        )
    }

    /// Bath is fully resolvable, Wells has no secondary identity, Atlantis has no region
    fn fetcher(members: &[(u64, &str)]) -> ScriptedFetcher {
        fetcher_with_items(members.iter().map(|(id, c)| member_json(*id, c)).collect())
    }

    fn fetcher_with_items(items: Vec<String>) -> ScriptedFetcher {
        ScriptedFetcher::new()
            .respond(
                SECONDARY,
                HttpResponse::ok(
                    r#"[{"constituency": "Bath", "name": "Wera Hobhouse", "person_id": "25690"},
                        {"constituency": "Atlantis", "name": "Nobody", "person_id": "1"}]"#,
                ),
            )
            .respond(
                REGIONS,
                HttpResponse::ok(
                    r#"<table id="England">
                        <tr><th>Constituency</th><th>Region</th></tr>
                        <tr><td>Bath</td><td>South West</td></tr>
                        <tr><td>Wells</td><td>South West</td></tr>
                    </table>"#,
                ),
            )
            .respond(POSTS, HttpResponse::ok("[]"))
            .respond(
                MEMBERS,
                HttpResponse::ok(format!(
                    r#"{{"totalResults": {}, "items": [{}]}}"#,
                    items.len(),
                    items.join(",")
                )),
            )
            .respond(
                "https://members.example/api/Members/1/LatestElectionResult",
                HttpResponse::ok(r#"{"value": {"electorate": 70000, "turnout": 50000, "majority": 12000}}"#),
            )
    }

    #[test]
    fn test_missing_region_skips_only_that_legislator() {
        let fetcher = fetcher(&[(1, "Bath"), (2, "Atlantis")])
            .respond("https://votes.example/mp/25690/votes", HttpResponse::ok(VOTE_PAGE));
        let config = config();
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let output = Pipeline::new(&fetcher, &config).run(&store).unwrap();
        let report = &output.report;

        assert_eq!(report.total, 2);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].constituency, "atlantis");
        assert_eq!(report.failures[0].code, "E300");
        assert!(!report.failures[0].critical);

        assert_eq!(store.count_by_label(MP_LABEL).unwrap(), 1);
        let mp = store.node_properties(MP_LABEL, "Wera Hobhouse").unwrap().unwrap();
        assert_eq!(mp["party"], "Labour");
        assert_eq!(mp["turnout"], 50_000);
        assert_eq!(store.count_by_edge_type("VOTED_FOR").unwrap(), 1);
        assert_eq!(output.legislators.len(), 1);
    }

    #[test]
    fn test_missing_identity_is_counted_critical() {
        let fetcher = fetcher(&[(1, "Bath"), (3, "Wells")])
            .respond("https://votes.example/mp/25690/votes", HttpResponse::ok(VOTE_PAGE));
        let config = config();
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let report = Pipeline::new(&fetcher, &config).run(&store).unwrap().report;

        assert_eq!(report.persisted, 1);
        assert_eq!(report.critical_failures(), 1);
        assert!(report.summary().contains("1 of 2 legislators persisted"));
    }

    #[test]
    fn test_unreadable_member_record_does_not_stop_the_run() {
        let wells = member_json(3, "Wells").replace("2017-06-08T00:00:00", "");
        let fetcher = fetcher_with_items(vec![member_json(1, "Bath"), wells])
            .respond("https://votes.example/mp/25690/votes", HttpResponse::ok(VOTE_PAGE));
        let config = config();
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let report = Pipeline::new(&fetcher, &config).run(&store).unwrap().report;

        assert_eq!(report.total, 2);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].constituency, "member 3");
        assert_eq!(report.failures[0].code, "E200");
        assert!(!report.failures[0].critical);
        assert!(store.node_properties(MP_LABEL, "Wera Hobhouse").unwrap().is_some());
    }

    #[test]
    fn test_unreadable_vote_page_is_persisted_flagged() {
        let fetcher = fetcher(&[(1, "Bath")])
            .respond("https://votes.example/mp/25690/votes", HttpResponse::with_status(503));
        let config = config();
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let report = Pipeline::new(&fetcher, &config).run(&store).unwrap().report;

        assert_eq!(report.persisted, 1);
        assert_eq!(report.flagged, 1);
        assert!(!report.is_clean());
        let mp = store.node_properties(MP_LABEL, "Wera Hobhouse").unwrap().unwrap();
        assert_eq!(mp["votes_complete"], false);
    }

    #[test]
    fn test_members_exhaustion_is_fatal() {
        let fetcher = ScriptedFetcher::new()
            .respond(SECONDARY, HttpResponse::ok("[]"))
            .respond(REGIONS, HttpResponse::ok(r#"<table id="England"><tr><th>Constituency</th><th>Region</th></tr></table>"#))
            .respond(POSTS, HttpResponse::ok("[]"))
            .respond(MEMBERS, HttpResponse::with_status(500));
        let config = config();
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let err = Pipeline::new(&fetcher, &config).run(&store).unwrap_err();

        assert!(matches!(err, PipelineError::SourceExhausted { attempts: 3, .. }));
        assert!(err.is_fatal());
        assert_eq!(fetcher.request_count(MEMBERS), 3);
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn test_upfront_source_failure_aborts() {
        let fetcher = ScriptedFetcher::new().respond(SECONDARY, HttpResponse::with_status(403));
        let config = config();
        let store = SqliteGraphStore::open_in_memory().unwrap();

        let err = Pipeline::new(&fetcher, &config).run(&store).unwrap_err();

        assert!(matches!(err, PipelineError::TransientSource { status: 403, .. }));
        assert_eq!(fetcher.request_count(MEMBERS), 0);
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let fetcher = ScriptedFetcher::new();
        let mut config = config();
        config.api_key = None;

        let err = Pipeline::new(&fetcher, &config).build_source_maps().unwrap_err();
        assert_eq!(err.code(), "E600");
    }

    #[test]
    fn test_snapshot_import_reports_records_that_failed_to_load() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "name": "MP 1", "party": "Labour", "constituency": "Bath",
                 "region": "South West", "start_date": "2017-06-08", "votes": []},
                {"id": 2, "name": "MP 2", "party": "Labour", "constituency": "Wells",
                 "region": "South West", "start_date": "2017-06-08", "votes": "none"}]"#,
        )
        .unwrap();

        let snapshot = crate::snapshot::load(&path).unwrap();
        let report = import_snapshot(&store, &snapshot);

        assert_eq!(report.total, 2);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].constituency, "Wells");
        assert_eq!(report.failures[0].code, "E301");
        assert_eq!(store.count_by_label(MP_LABEL).unwrap(), 1);
    }

    #[test]
    fn test_import_renders_cypher() {
        let fetcher = fetcher(&[(1, "Bath")])
            .respond("https://votes.example/mp/25690/votes", HttpResponse::ok(VOTE_PAGE));
        let config = config();
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let output = Pipeline::new(&fetcher, &config).run(&store).unwrap();

        let script = CypherScript::new();
        let report = import_legislators(&script, &output.legislators);

        assert_eq!(report.persisted, 1);
        assert_eq!(report.nodes_written, output.report.nodes_written);
        assert!(script.render().contains("MERGE (n:MP {name: 'Wera Hobhouse'})"));
    }
}
