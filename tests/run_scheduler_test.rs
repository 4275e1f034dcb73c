// ==========================================
// 求解调度器集成测试
// ==========================================
// 场景: 后台调度循环、排队取消、停机
// ==========================================

mod helpers;

use std::time::Duration;

use committee_assignment::domain::ConfigStatus;
use committee_assignment::service::CancelOutcome;
use helpers::scenario::*;

fn dataset() -> committee_assignment::api::MatchingDataset {
    DatasetBuilder::new()
        .papers(2)
        .members(&["~A1", "~B1"])
        .affinity("P1", "~A1", 0.9)
        .affinity("P2", "~B1", 0.7)
        .build()
}

async fn wait_for_status(env: &TestEnv, config_id: &str, expected: ConfigStatus) {
    for _ in 0..250 {
        let status = env.state.matching_api.get_status(config_id).unwrap().status;
        if status == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("config {} did not reach {}", config_id, expected);
}

#[tokio::test]
async fn test_background_worker_completes_submitted_runs() {
    let env = TestEnv::new().await;
    let api = env.state.matching_api.clone();
    api.load_dataset(&dataset()).unwrap();
    let first = api.create_configuration(content("bg-1", "MinMax", 1, 1)).unwrap();
    let second = api.create_configuration(content("bg-2", "FairFlow", 1, 1)).unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let scheduler = env.state.scheduler.clone();
    let worker = tokio::spawn(async move {
        scheduler
            .serve(async {
                let _ = stop_rx.await;
            })
            .await
    });

    api.submit_run(&first.id).unwrap();
    api.submit_run(&second.id).unwrap();
    wait_for_status(&env, &first.id, ConfigStatus::Complete).await;
    wait_for_status(&env, &second.id, ConfigStatus::Complete).await;

    stop_tx.send(()).unwrap();
    worker.await.unwrap().unwrap();

    let counts = api.queue_counts().unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.running, 0);
    assert_eq!(counts.completed, 2);

    let status = api.get_status(&first.id).unwrap();
    assert!(!status.running);
    assert_eq!(status.proposed_edges, 2);
    assert!(status.latest_task.and_then(|t| t.settings_snapshot).is_some());
}

#[tokio::test]
async fn test_cancel_queued_run_then_resubmit() {
    let env = TestEnv::new().await;
    let api = &env.state.matching_api;
    api.load_dataset(&dataset()).unwrap();
    let config = api.create_configuration(content("cancel-me", "MinMax", 1, 1)).unwrap();

    api.submit_run(&config.id).unwrap();
    assert_eq!(api.cancel_run(&config.id).unwrap(), CancelOutcome::Dequeued);
    assert_eq!(api.get_status(&config.id).unwrap().status, ConfigStatus::Cancelled);
    assert_eq!(api.drain_queue().await.unwrap(), 0);
    assert_eq!(api.queue_counts().unwrap().cancelled, 1);

    // Cancelled 可以重新排队
    api.submit_run(&config.id).unwrap();
    assert_eq!(api.drain_queue().await.unwrap(), 1);
    assert_eq!(api.get_status(&config.id).unwrap().status, ConfigStatus::Complete);
}

#[tokio::test]
async fn test_infeasible_run_does_not_block_other_runs() {
    let env = TestEnv::new().await;
    let api = &env.state.matching_api;
    api.load_dataset(&dataset()).unwrap();

    let healthy = api.create_configuration(content("healthy", "MinMax", 1, 1)).unwrap();
    let mut tight = content("tight", "MinMax", 2, 1);
    tight.min_papers = "1".to_string();
    let tight = api.create_configuration(tight).unwrap();

    api.submit_run(&tight.id).unwrap();
    api.submit_run(&healthy.id).unwrap();
    assert_eq!(api.drain_queue().await.unwrap(), 2);

    assert_eq!(api.get_status(&tight.id).unwrap().status, ConfigStatus::NoSolution);
    assert_eq!(api.get_status(&healthy.id).unwrap().status, ConfigStatus::Complete);
}
