//! Node service round trips over TCP with a mock fetcher

use fetchpulse::distributed::protocol::{CreateJobMessage, ErrorKind, Message};
use fetchpulse::distributed::{
    BatchCoordinator, NodeService, PeerSettings, ReadMode, ServiceState, TcpPeerClient,
    SINGLE_HOST_ADVISORY,
};
use fetchpulse::fetch::mock::{MockFetcher, MockOutcome};
use fetchpulse::job::{JobId, JobRegistry, JobReport, JobRequest, JobSettings, JobStatus};
use fetchpulse::registry::{HostRecord, HostRegistry};
use std::sync::Arc;
use std::time::Duration;

const URL: &str = "http://img.example/logo.png";

fn client() -> TcpPeerClient {
    TcpPeerClient::new(PeerSettings {
        request_timeout: Duration::from_secs(5),
        retries: 1,
        retry_backoff: Duration::from_millis(20),
    })
}

/// Start a node service on an ephemeral port; returns its address
async fn start_node(label: &str, fetcher: MockFetcher) -> String {
    let hosts = Arc::new(HostRegistry::new());
    let jobs = Arc::new(JobRegistry::new(label, Arc::new(fetcher), JobSettings::default()));
    let batches = Arc::new(BatchCoordinator::new(
        hosts.clone(),
        Arc::new(client()),
        ReadMode::Strict,
    ));
    let state = Arc::new(ServiceState::new(jobs, hosts, batches));

    let service = NodeService::bind("127.0.0.1:0", state).await.unwrap();
    let address = service.local_addr().unwrap().to_string();
    tokio::spawn(service.run());
    address
}

async fn send(address: &str, msg: Message) -> Message {
    client().request(address, &msg).await.unwrap()
}

async fn create_job(address: &str, iterations: u32) -> JobId {
    let msg = Message::CreateJob(CreateJobMessage::new(JobRequest::new(URL, Some(iterations))));
    match send(address, msg).await {
        Message::JobAccepted(accepted) => accepted.job_id,
        other => panic!("unexpected reply: {:?}", other),
    }
}

/// Poll until the job is terminal
async fn wait_for_report(address: &str, job_id: JobId) -> JobReport {
    for _ in 0..500 {
        match send(address, Message::GetJob { job_id, limit: Some(100) }).await {
            Message::JobResults(report) if report.status.is_terminal() => return report,
            Message::JobResults(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            other => panic!("unexpected reply: {:?}", other),
        }
    }
    panic!("job {} never finished", job_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_reply() {
    let address = start_node("node-a", MockFetcher::new()).await;

    match send(&address, Message::Status).await {
        Message::StatusReply(status) => {
            assert_eq!(status.status, "active");
            assert_eq!(status.host_label, "node-a");
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_job_lifecycle() {
    let fetcher = MockFetcher::scripted([MockOutcome::Http(503)]);
    let address = start_node("node-a", fetcher).await;

    let job_id = create_job(&address, 4).await;
    let report = wait_for_report(&address, job_id).await;

    assert_eq!(report.status, JobStatus::PartialError);
    assert_eq!(report.trials.len(), 4);
    let eval = report.success_evaluation.unwrap();
    assert_eq!(eval.completed_count, 3);
    assert_eq!(eval.failed_count, 1);
    assert_eq!(eval.error_rate, 0.25);
    assert!(report.metrics.is_some());

    // Second job gets a fresh id
    assert_ne!(create_job(&address, 1).await, job_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pending_job_hides_trials() {
    let fetcher = MockFetcher::new();
    fetcher.hold_after(1);
    let address = start_node("node-a", fetcher.clone()).await;

    let job_id = create_job(&address, 3).await;

    match send(&address, Message::GetJob { job_id, limit: None }).await {
        Message::JobResults(report) => {
            assert_eq!(report.status, JobStatus::Pending);
            assert!(report.trials.is_empty());
            assert!(report.success_evaluation.is_none());
            assert!(report.metrics.is_none());
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    fetcher.release_all();
    assert_eq!(wait_for_report(&address, job_id).await.trials.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_job_mutation_and_lookup_errors() {
    let address = start_node("node-a", MockFetcher::new()).await;
    let job_id = create_job(&address, 1).await;

    let reply = send(
        &address,
        Message::UpdateJob {
            job_id,
            request: JobRequest::new(URL, Some(9)),
        },
    )
    .await;
    assert!(matches!(reply, Message::Error(ref e) if e.kind == ErrorKind::Forbidden));

    let reply = send(&address, Message::DeleteJob { job_id }).await;
    assert!(matches!(reply, Message::Error(ref e) if e.kind == ErrorKind::Forbidden));

    let reply = send(&address, Message::GetJob { job_id: 999, limit: None }).await;
    assert!(matches!(reply, Message::Error(ref e) if e.kind == ErrorKind::NotFound));

    let reply = send(&address, Message::GetBatch { batch_id: 5, limit: None }).await;
    assert!(matches!(reply, Message::Error(ref e) if e.kind == ErrorKind::NotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_across_two_nodes() {
    let coordinator = start_node("node-a", MockFetcher::new()).await;
    let peer = start_node("node-b", MockFetcher::new()).await;

    let reply = send(&coordinator, Message::CreateBatch(JobRequest::new(URL, Some(2)))).await;
    assert!(matches!(reply, Message::Error(ref e) if e.kind == ErrorKind::NoHosts));

    for (address, label) in [(&coordinator, "node-a"), (&peer, "node-b")] {
        let reply = send(
            &coordinator,
            Message::RegisterHost(HostRecord::new(address.clone(), label)),
        )
        .await;
        assert_eq!(reply, Message::Ack);
    }

    let created = match send(&coordinator, Message::CreateBatch(JobRequest::new(URL, Some(2)))).await {
        Message::BatchCreated(created) => created,
        other => panic!("unexpected reply: {:?}", other),
    };
    assert!(created.advisory.is_none());
    assert_eq!(created.assignments.len(), 2);
    assert!(created.failed_hosts.is_empty());

    for assignment in &created.assignments {
        wait_for_report(&assignment.address, assignment.job_id).await;
    }

    match send(&coordinator, Message::GetBatch { batch_id: created.batch_id, limit: Some(1) }).await {
        Message::BatchResults(results) => {
            let labels: Vec<_> = results.reports.iter().map(|r| r.host_label.as_str()).collect();
            assert_eq!(labels, vec!["node-a", "node-b"]);
            assert!(results.reports.iter().all(|r| r.status == JobStatus::Completed));
            assert!(results.reports.iter().all(|r| r.trials.len() == 1));
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_host_batch_then_upstream_unavailable() {
    let coordinator = start_node("node-a", MockFetcher::new()).await;

    // A peer that accepts the job and then disappears
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let vanishing = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = fetchpulse::distributed::protocol::read_message(&mut stream).await.unwrap();
        let reply = Message::JobAccepted(fetchpulse::distributed::protocol::JobAcceptedMessage {
            job_id: 1,
            host_label: "ghost".to_string(),
        });
        fetchpulse::distributed::protocol::write_message(&mut stream, &reply)
            .await
            .unwrap();
        // Listener and stream drop here; later reads are refused
    });

    let reply = send(&coordinator, Message::RegisterHost(HostRecord::new(vanishing, "ghost"))).await;
    assert_eq!(reply, Message::Ack);

    let created = match send(&coordinator, Message::CreateBatch(JobRequest::new(URL, Some(1)))).await {
        Message::BatchCreated(created) => created,
        other => panic!("unexpected reply: {:?}", other),
    };
    assert_eq!(created.advisory.as_deref(), Some(SINGLE_HOST_ADVISORY));

    // Give the fake peer time to shut down
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = send(&coordinator, Message::GetBatch { batch_id: created.batch_id, limit: None }).await;
    assert!(matches!(reply, Message::Error(ref e) if e.kind == ErrorKind::UpstreamUnavailable));
}
