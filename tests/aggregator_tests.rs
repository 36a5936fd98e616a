// Aggregator: partial failure, classification, environment hygiene

mod common;

use chrono::Utc;
use common::*;
use safetytwin_agent::aggregator::Aggregator;
use safetytwin_agent::classifier::Classifier;
use safetytwin_agent::models::*;
use std::sync::atomic::Ordering;

fn aggregator(
    hardware: Option<FakeHardware>,
    processes: Option<FakeProcesses>,
    services: Option<FakeServices>,
) -> Aggregator<FakeHardware, FakeProcesses, FakeServices> {
    Aggregator::new(hardware, processes, services, Classifier::default())
}

#[tokio::test]
async fn every_subset_of_failing_sources_still_builds_a_snapshot() {
    for mask in 0u8..8 {
        let hw_fails = mask & 1 != 0;
        let proc_fails = mask & 2 != 0;
        let svc_fails = mask & 4 != 0;

        let hw = if hw_fails {
            FakeSource::failing("hardware", "no sysfs")
        } else {
            FakeSource::ok("hardware", hardware())
        };
        let procs = if proc_fails {
            FakeSource::failing("processes", "no procfs")
        } else {
            FakeSource::ok("processes", vec![process(1, "init", &["/sbin/init"])])
        };
        let svcs = if svc_fails {
            FakeSource::failing("services", "no docker")
        } else {
            FakeSource::ok("services", vec![container("web", "nginx")])
        };

        let (snap, failures) = aggregator(Some(hw), Some(procs), Some(svcs))
            .build_snapshot()
            .await;

        assert_eq!(snap.hardware.is_none(), hw_fails, "mask {mask}");
        assert_eq!(snap.processes.is_empty(), proc_fails, "mask {mask}");
        assert_eq!(snap.services.is_empty(), svc_fails, "mask {mask}");

        let mut failed: Vec<&str> = failures.iter().map(|f| f.source).collect();
        failed.sort();
        let mut expected = vec![];
        if hw_fails {
            expected.push("hardware");
        }
        if proc_fails {
            expected.push("processes");
        }
        if svc_fails {
            expected.push("services");
        }
        expected.sort();
        assert_eq!(failed, expected, "mask {mask}");
    }
}

#[tokio::test]
async fn each_enabled_source_is_called_exactly_once() {
    let hw = FakeSource::ok("hardware", hardware());
    let procs = FakeSource::ok("processes", vec![]);
    let svcs = FakeSource::failing("services", "down");
    let counters = [hw.calls(), procs.calls(), svcs.calls()];

    aggregator(Some(hw), Some(procs), Some(svcs))
        .build_snapshot()
        .await;

    for c in counters {
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn disabled_sources_are_empty_but_not_failures() {
    let (snap, failures) = aggregator(None, None, None).build_snapshot().await;
    assert!(snap.hardware.is_none());
    assert!(snap.processes.is_empty());
    assert!(snap.services.is_empty());
    assert!(failures.is_empty());
}

#[tokio::test]
async fn timestamp_is_taken_after_sources_return() {
    let before = Utc::now();
    let (snap, _) = aggregator(
        Some(FakeSource::ok("hardware", hardware())),
        None,
        None,
    )
    .build_snapshot()
    .await;
    assert!(snap.timestamp >= before);
    assert!(snap.timestamp <= Utc::now());
}

#[tokio::test]
async fn processes_and_services_are_classified() {
    let procs = vec![
        process(10, "bash", &["bash"]),
        process(11, "python3", &["python3", "-m", "torch.distributed.run"]),
        process(12, "node", &["node", "server.js"]),
    ];
    let mut tgi = container("tgi", "ghcr.io/huggingface/text-generation-inference");
    tgi.command = Some("text-generation-launcher".into());
    let svcs = vec![container("web", "nginx:1.25"), tgi];

    let (snap, _) = aggregator(
        None,
        Some(FakeSource::ok("processes", procs)),
        Some(FakeSource::ok("services", svcs)),
    )
    .build_snapshot()
    .await;

    let related: Vec<u32> = snap
        .processes
        .iter()
        .filter(|p| p.is_related)
        .map(|p| p.pid)
        .collect();
    assert_eq!(related, vec![11]);
    assert!(!snap.services[0].is_related);
    assert!(snap.services[1].is_related);
    assert_eq!(snap.related_process_count(), 1);
    assert_eq!(snap.related_service_count(), 1);
}

#[tokio::test]
async fn environment_kept_masked_only_for_related_processes() {
    let mut plain = process(20, "postgres", &["postgres"]);
    plain.environment = vec!["PGDATA=/var/lib/pg".into(), "PGPASSWORD=x".into()];
    plain.open_files = vec!["/var/lib/pg/base/1".into()];

    let mut llm = process(21, "worker", &["./worker"]);
    llm.environment = vec![
        "MODEL_NAME=mistral-7b".into(),
        "HF_TOKEN=hf_secret".into(),
        "BROKEN".into(),
    ];
    llm.open_files = vec!["/models/model-7b.safetensors".into()];

    let mut svc = container("api", "registry/api:1");
    svc.environment = vec!["DB_PASSWORD=hunter2".into(), "PORT=80".into()];

    let (snap, _) = aggregator(
        None,
        Some(FakeSource::ok("processes", vec![plain, llm])),
        Some(FakeSource::ok("services", vec![svc])),
    )
    .build_snapshot()
    .await;

    let plain = &snap.processes[0];
    assert!(!plain.is_related);
    assert!(plain.environment.is_empty());
    assert!(plain.open_files.is_empty());

    let llm = &snap.processes[1];
    assert!(llm.is_related);
    assert_eq!(
        llm.environment,
        vec!["MODEL_NAME=mistral-7b", "HF_TOKEN=***FILTERED***"]
    );
    assert_eq!(llm.open_files, vec!["/models/model-7b.safetensors"]);

    assert_eq!(
        snap.services[0].environment,
        vec!["DB_PASSWORD=***FILTERED***", "PORT=80"]
    );
}

#[tokio::test]
async fn source_output_order_is_preserved() {
    let procs = vec![
        process(30, "c", &[]),
        process(5, "a", &[]),
        process(17, "b", &[]),
    ];
    let (snap, _) = aggregator(None, Some(FakeSource::ok("processes", procs)), None)
        .build_snapshot()
        .await;
    let pids: Vec<u32> = snap.processes.iter().map(|p: &ProcessRecord| p.pid).collect();
    assert_eq!(pids, vec![30, 5, 17]);
}
