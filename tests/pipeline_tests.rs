//! # Pipeline Tests
//!
//! End-to-end runs of the bundled sparkify pipeline against the in-memory
//! warehouse:
//! 1. Graph shape and parallel layers
//! 2. Happy path, idempotent re-runs
//! 3. Ordering under randomized latency
//! 4. Failure propagation (skips, retries, assertion errors)
//! 5. Run context rendering and secret redaction

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use sparkify_etl::{
    ErrorKind, EtlError, EventKind, InMemoryWarehouse, PipelineDef, PipelineGraph, RetryPolicy,
    RunContext, Runner, Scalar, StaticCredentialProvider, TaskAction, TaskState,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

const PIPELINE: &str = include_str!("../pipelines/sparkify.yaml");

const DIMENSIONS: [&str; 4] = [
    "load_user_dim_table",
    "load_song_dim_table",
    "load_artist_dim_table",
    "load_time_dim_table",
];

fn bundled_graph() -> PipelineGraph {
    PipelineDef::from_yaml(PIPELINE).unwrap().build().unwrap()
}

fn ctx() -> RunContext {
    RunContext::for_date(NaiveDate::from_ymd_opt(2018, 11, 1).unwrap()).with_run_id("test-run")
}

fn credentials() -> Arc<StaticCredentialProvider> {
    Arc::new(StaticCredentialProvider::single(
        "aws_credentials",
        "AKIATESTACCESSKEY",
        "sup3r-s3cret",
    ))
}

/// Warehouse with storage objects, tables and transform results for every task
fn seeded_warehouse(graph: &PipelineGraph) -> InMemoryWarehouse {
    let mut wh = InMemoryWarehouse::new()
        .with_table("public.staging_events", &["artist", "song", "userid"])
        .with_table("public.staging_songs", &["song_id", "title"])
        .with_table("public.songplays", &["playid", "start_time", "userid"])
        .with_table("public.users", &["userid", "firstname"])
        .with_table("public.songs", &["songid", "title"])
        .with_table("public.artists", &["artistid", "name"])
        .with_table("public.time", &["start_time", "hour"])
        .with_object(
            "s3://udacity-dend/log-data/2018/11/2018-11-01-events.json",
            vec![
                vec!["Muse".into(), "Uprising".into(), Scalar::Int(8)],
                vec!["Blur".into(), "Song 2".into(), Scalar::Int(26)],
            ],
        )
        .with_object(
            "s3://udacity-dend/song-data/A/A/A/TRAAAAW128F429D538.json",
            vec![vec!["SOMZWCG12A8C13C480".into(), "Uprising".into()]],
        );

    let rows: HashMap<&str, Vec<Vec<Scalar>>> = HashMap::from([
        (
            "public.songplays",
            vec![vec!["p1".into(), "2018-11-01 21:01:46".into(), Scalar::Int(8)]],
        ),
        ("public.users", vec![vec![Scalar::Int(8), "Kaylee".into()]]),
        ("public.songs", vec![vec!["SOMZWCG12A8C13C480".into(), "Uprising".into()]]),
        ("public.artists", vec![vec!["ARD7TVE1187B99BFB1".into(), "Muse".into()]]),
        ("public.time", vec![vec!["2018-11-01 21:01:46".into(), Scalar::Int(21)]]),
    ]);

    for task in graph.iter() {
        if let TaskAction::FactLoad(load) | TaskAction::DimensionLoad(load) = task.action() {
            let produced = rows.get(load.table()).cloned().unwrap_or_default();
            wh = wh.with_transform(load.query(), produced);
        }
    }
    wh
}

fn runner(graph: PipelineGraph, wh: &InMemoryWarehouse) -> Runner {
    Runner::new(graph, Arc::new(wh.clone()), credentials())
        .with_retry_policy(RetryPolicy::new(3, Duration::ZERO))
}

fn names(ids: &[Arc<str>]) -> Vec<&str> {
    ids.iter().map(|s| s.as_ref()).collect()
}

// ============================================================================
// GRAPH SHAPE
// ============================================================================

#[test]
fn bundled_pipeline_layers() {
    let graph = bundled_graph();
    let layers = graph.layers();
    let layers: Vec<Vec<&str>> = layers.iter().map(|l| names(l)).collect();

    assert_eq!(
        layers,
        vec![
            vec!["stage_events", "stage_songs"],
            vec!["load_songplays_fact_table"],
            DIMENSIONS.to_vec(),
            vec!["data_quality_checks"],
        ]
    );
    assert_eq!(names(&graph.roots()), ["stage_events", "stage_songs"]);
    assert_eq!(names(&graph.sinks()), ["data_quality_checks"]);
}

#[test]
fn bundled_quality_gate_has_seven_checks_in_order() {
    let graph = bundled_graph();
    let TaskAction::QualityGate(gate) = graph.get("data_quality_checks").unwrap().action() else {
        panic!("expected a quality gate");
    };
    assert_eq!(gate.checks().len(), 7);
    assert!(gate.checks()[0].sql.contains("public.artists"));
    assert!(gate.checks()[5].sql.contains(r#"public."time""#));
    assert!(gate.checks().iter().all(|c| c.expected == Scalar::Int(0)));
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn full_run_loads_every_table_and_passes_checks() {
    let graph = bundled_graph();
    let wh = seeded_warehouse(&graph);

    let report = runner(graph, &wh).run(ctx()).await;

    assert!(report.is_success(), "{}", report.render_summary());
    assert_eq!(wh.rows("public.staging_events").len(), 2);
    assert_eq!(wh.rows("public.staging_songs").len(), 1);
    for table in ["songplays", "users", "songs", "artists", "time"] {
        assert_eq!(wh.rows(table).len(), 1, "{table}");
    }
}

#[tokio::test]
async fn rerun_with_same_context_is_idempotent() {
    let graph = bundled_graph();
    let wh = seeded_warehouse(&graph);

    assert!(runner(graph.clone(), &wh).run(ctx()).await.is_success());
    let snapshot: Vec<_> = ["staging_events", "staging_songs", "songplays", "users", "time"]
        .iter()
        .map(|t| wh.rows(t))
        .collect();

    assert!(runner(graph, &wh).run(ctx()).await.is_success());
    let again: Vec<_> = ["staging_events", "staging_songs", "songplays", "users", "time"]
        .iter()
        .map(|t| wh.rows(t))
        .collect();

    assert_eq!(snapshot, again);
}

// ============================================================================
// ORDERING
// ============================================================================

#[tokio::test]
async fn randomized_latency_never_breaks_dependency_order() {
    for _ in 0..100 {
        let graph = bundled_graph();
        let wh = seeded_warehouse(&graph).with_latency(Duration::ZERO, Duration::from_millis(2));
        let runner = runner(graph.clone(), &wh);

        let report = runner.run(ctx()).await;
        assert!(report.is_success());

        let mut first_start: HashMap<String, u64> = HashMap::new();
        let mut succeeded: HashMap<String, u64> = HashMap::new();
        for event in runner.event_log().events() {
            match &event.kind {
                EventKind::TaskStarted { task_id, .. } => {
                    first_start.entry(task_id.to_string()).or_insert(event.id);
                }
                EventKind::TaskSucceeded { task_id, .. } => {
                    succeeded.insert(task_id.to_string(), event.id);
                }
                _ => {}
            }
        }

        for task in graph.iter() {
            for dep in task.dependencies() {
                assert!(
                    succeeded[dep.as_ref()] < first_start[task.name()],
                    "{} started before {} finished",
                    task.name(),
                    dep
                );
            }
        }
    }
}

// ============================================================================
// FAILURE PROPAGATION
// ============================================================================

#[tokio::test]
async fn failed_stage_skips_everything_downstream() {
    let graph = bundled_graph();
    let wh = seeded_warehouse(&graph).fail_on("COPY public.staging_events", ErrorKind::Connection);

    let report = runner(graph, &wh).run(ctx()).await;

    assert!(!report.is_success());
    assert!(matches!(
        report.state("stage_events"),
        Some(TaskState::Failed { attempts: 3, .. })
    ));
    assert!(report.state("stage_songs").unwrap().is_succeeded());
    assert_eq!(report.failed(), ["stage_events"]);
    assert_eq!(report.skipped().len(), 6);
    for task in report.skipped() {
        assert!(matches!(
            report.state(task),
            Some(TaskState::Skipped { upstream }) if &**upstream == "stage_events"
        ));
    }
    assert!(wh.statements_matching("INSERT").is_empty());
}

#[tokio::test]
async fn failed_dimension_skips_only_the_gate() {
    let graph = bundled_graph();
    let wh = seeded_warehouse(&graph).fail_on("INSERT INTO public.artists", ErrorKind::Load);

    let report = runner(graph, &wh).run(ctx()).await;

    assert_eq!(report.failed(), ["load_artist_dim_table"]);
    assert_eq!(report.skipped(), ["data_quality_checks"]);
    for dim in ["load_user_dim_table", "load_song_dim_table", "load_time_dim_table"] {
        assert!(report.state(dim).unwrap().is_succeeded(), "{dim}");
    }
    assert!(matches!(
        report.first_error(),
        Some(EtlError::StatementFailed { reason }) if reason.contains("public.artists")
    ));
}

#[tokio::test]
async fn null_keys_fail_the_gate_once_with_every_mismatch() {
    let graph = bundled_graph();
    let wh = seeded_warehouse(&graph);
    // artists and users both produce a NULL key
    let wh = {
        let mut wh = wh;
        for task in graph.iter() {
            if let TaskAction::DimensionLoad(load) = task.action() {
                if load.table() == "public.artists" || load.table() == "public.users" {
                    wh = wh.with_transform(load.query(), vec![vec![Scalar::Null, "x".into()]]);
                }
            }
        }
        wh
    };

    let report = runner(graph, &wh).run(ctx()).await;

    let Some(TaskState::Failed { error, attempts }) = report.state("data_quality_checks") else {
        panic!("gate should fail");
    };
    assert_eq!(*attempts, 1);
    assert_eq!(error.kind(), ErrorKind::Assertion);
    let EtlError::QualityCheckFailed { failures } = error.as_ref() else {
        panic!("unexpected error: {error}");
    };
    assert_eq!(failures.len(), 2);
    assert!(failures[0].sql.contains("public.artists"));
    assert!(failures[1].sql.contains("public.users"));
    assert!(failures.iter().all(|f| f.observed == Scalar::Int(1)));
    // dimension loads are not rolled back
    assert_eq!(wh.rows("public.artists").len(), 1);
}

#[tokio::test]
async fn missing_credentials_fail_without_retry() {
    let graph = bundled_graph();
    let wh = seeded_warehouse(&graph);
    let runner = Runner::new(graph, Arc::new(wh.clone()), Arc::new(StaticCredentialProvider::default()))
        .with_retry_policy(RetryPolicy::new(3, Duration::ZERO));

    let report = runner.run(ctx()).await;

    for stage in ["stage_events", "stage_songs"] {
        let Some(TaskState::Failed { error, attempts }) = report.state(stage) else {
            panic!("{stage} should fail");
        };
        assert_eq!(*attempts, 1);
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }
    assert!(wh.statements().is_empty());
}

// ============================================================================
// RUN CONTEXT & REDACTION
// ============================================================================

#[tokio::test]
async fn backfill_renders_keys_from_the_logical_date() {
    let yaml = r#"
schema: sparkify/pipeline@0.1
name: backfill
tasks:
  - id: stage_events
    stage:
      table: public.staging_events
      bucket: udacity-dend
      key: log-data/{year}/{month}/{ds}-events.json
"#;
    let wh = InMemoryWarehouse::new();
    for day in [1, 2] {
        let graph = PipelineDef::from_yaml(yaml).unwrap().build().unwrap();
        let context = RunContext::for_date(NaiveDate::from_ymd_opt(2018, 11, day).unwrap());
        assert!(runner(graph, &wh).run(context).await.is_success());
    }

    let copies = wh.statements_matching("COPY");
    assert_eq!(copies.len(), 2);
    assert!(copies[0].sql.contains("'s3://udacity-dend/log-data/2018/11/2018-11-01-events.json'"));
    assert!(copies[1].sql.contains("'s3://udacity-dend/log-data/2018/11/2018-11-02-events.json'"));
}

#[tokio::test]
async fn event_log_never_contains_secrets() {
    let graph = bundled_graph();
    let wh = seeded_warehouse(&graph);
    let runner = runner(graph, &wh);

    runner.run(ctx()).await;

    let json = runner.event_log().to_json().to_string();
    assert!(json.contains("ACCESS_KEY_ID '****'"));
    assert!(!json.contains("AKIATESTACCESSKEY"));
    assert!(!json.contains("sup3r-s3cret"));
    // the warehouse itself received the real keys
    assert!(wh.statements_matching("AKIATESTACCESSKEY").len() == 2);
}
