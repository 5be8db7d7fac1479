use super::*;
use std::collections::HashSet;

async fn create(translator: &BiblioTranslator, records: usize) -> TaskId {
    translator
        .create_task(new_task(vec![provider_config("p1", 1)], records))
        .await
        .unwrap()
}

/// Run a failing task until the threshold pauses it
async fn create_auto_paused(
    translator: &BiblioTranslator,
    factory: &MockProviderFactory,
    records: usize,
) -> TaskId {
    factory.set_default(Behaviour::Fail("HTTP 503".into()));
    let id = create(translator, records).await;
    translator.run_scheduling_cycle().await.unwrap();
    settle(translator).await;
    assert_eq!(
        translator.get_task(&id).await.unwrap().status,
        TaskStatus::Paused
    );
    factory.set_default(Behaviour::Succeed);
    id
}

fn assert_invalid_state(result: crate::Result<impl std::fmt::Debug>, operation: &str) {
    match result {
        Err(Error::Task(TaskError::InvalidState { operation: op, .. })) => {
            assert_eq!(op, operation)
        }
        other => panic!("expected invalid state for {operation}, got {other:?}"),
    }
}

#[tokio::test]
async fn pause_stops_at_the_next_record_boundary() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let gate = factory.install_gate();
    let id = create(&translator, 3).await;

    translator.run_scheduling_cycle().await.unwrap();
    assert_eq!(gate.wait_started().await, "Title 1");

    translator.pause(&id).await.unwrap();
    gate.release(100);
    settle(&translator).await;

    let task = translator.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Paused);
    assert_eq!(task.completed_count, 1, "the in-flight record is finished");

    let records = translator.get_records(&id).await.unwrap();
    assert_eq!(records[0].status, RecordStatus::Completed);
    assert_eq!(records[1].status, RecordStatus::Pending);
    assert!(records[1].translated_title.is_empty());
    assert_eq!(translator.scheduler_status().await.running_tasks, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_stops_every_partitioned_worker() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let gate = factory.install_gate();
    let id = translator
        .create_task(new_task(vec![provider_config("p1", 3)], 9))
        .await
        .unwrap();

    translator.run_scheduling_cycle().await.unwrap();
    let mut started = HashSet::new();
    for _ in 0..3 {
        started.insert(gate.wait_started().await);
    }
    assert_eq!(
        started,
        HashSet::from(["Title 1".to_string(), "Title 4".to_string(), "Title 7".to_string()])
    );

    translator.pause(&id).await.unwrap();
    gate.release(100);
    settle(&translator).await;

    let task = translator.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Paused);
    assert_eq!(task.completed_count, 3, "in-flight records are finished");

    let titles: HashSet<_> = factory
        .calls()
        .into_iter()
        .filter(|call| call.text.starts_with("Title"))
        .map(|call| call.text)
        .collect();
    assert_eq!(titles, started, "no record starts after the pause");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_stops_every_shared_queue_worker() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let gate = factory.install_gate();
    let id = translator
        .create_task(new_task(
            vec![provider_config("p1", 1), provider_config("p2", 1)],
            8,
        ))
        .await
        .unwrap();

    translator.run_scheduling_cycle().await.unwrap();
    let mut started = HashSet::new();
    for _ in 0..2 {
        started.insert(gate.wait_started().await);
    }
    assert_eq!(
        started,
        HashSet::from(["Title 1".to_string(), "Title 2".to_string()])
    );

    translator.pause(&id).await.unwrap();
    gate.release(100);
    settle(&translator).await;

    let task = translator.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Paused);
    assert_eq!(task.completed_count, 2);

    let records = translator.get_records(&id).await.unwrap();
    assert!(records[2..].iter().all(|r| r.status == RecordStatus::Pending));
}

#[tokio::test]
async fn pause_requires_a_running_task() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;
    let id = create(&translator, 1).await;

    assert_invalid_state(translator.pause(&id).await, "pause");

    assert!(matches!(
        translator.pause(&TaskId::from("2024-05-01/0099")).await,
        Err(Error::Task(TaskError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn pausing_a_paused_task_is_a_no_op() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let id = create_auto_paused(&translator, &factory, 6).await;

    translator.pause(&id).await.unwrap();
    assert_eq!(
        translator.get_task(&id).await.unwrap().status,
        TaskStatus::Paused
    );
}

#[tokio::test]
async fn resume_continues_without_double_counting() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let id = create_auto_paused(&translator, &factory, 8).await;

    translator.resume(&id).await.unwrap();
    assert_eq!(
        translator.get_task(&id).await.unwrap().status,
        TaskStatus::Pending
    );

    translator.run_scheduling_cycle().await.unwrap();
    let task = wait_for_status(&translator, &id, TaskStatus::Completed).await;

    assert_eq!(task.completed_count, 8);
    assert_eq!(task.failed_count, 0);
    assert!(
        translator
            .get_records(&id)
            .await
            .unwrap()
            .iter()
            .all(|r| r.status == RecordStatus::Completed && r.error_message.is_empty())
    );
}

#[tokio::test]
async fn resume_requires_a_paused_task() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;
    let id = create(&translator, 1).await;

    assert_invalid_state(translator.resume(&id).await, "resume");
}

#[tokio::test]
async fn resume_rolls_back_stranded_records() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let id = create_auto_paused(&translator, &factory, 6).await;

    let mut stranded = translator.db.get_record(&id, 6).await.unwrap().unwrap();
    stranded.status = RecordStatus::Translating;
    translator.db.save_record(&id, &stranded).await.unwrap();

    translator.resume(&id).await.unwrap();

    let record = translator.db.get_record(&id, 6).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
}

#[tokio::test]
async fn retry_failed_resets_only_failed_records() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    factory.set_default(Behaviour::FailMatching("Title 2".into()));
    let id = create(&translator, 3).await;

    translator.run_scheduling_cycle().await.unwrap();
    wait_for_status(&translator, &id, TaskStatus::Completed).await;
    settle(&translator).await;

    factory.set_default(Behaviour::Succeed);
    let summary = translator.retry_failed(&id, None).await.unwrap();
    assert_eq!(summary.reset_count, 1);

    let task = translator.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.completed_count, 2);
    assert_eq!(task.failed_count, 0);

    let records = translator.get_records(&id).await.unwrap();
    assert_eq!(records[1].status, RecordStatus::Pending);
    assert!(records[1].error_message.is_empty());
    assert_eq!(records[0].status, RecordStatus::Completed);

    translator.run_scheduling_cycle().await.unwrap();
    let task = wait_for_status(&translator, &id, TaskStatus::Completed).await;
    assert_eq!(task.completed_count, 3);
}

#[tokio::test]
async fn reset_clears_every_record_and_replaces_providers() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let id = create_auto_paused(&translator, &factory, 6).await;

    let summary = translator
        .reset(&id, Some(vec![provider_config("p2", 2)]))
        .await
        .unwrap();
    assert_eq!(summary.reset_count, 6);

    let task = translator.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.completed_count, 0);
    assert_eq!(task.failed_count, 0);
    assert_eq!(task.providers[0].id, "p2");
    assert_eq!(task.providers[0].threads, 2);
}

#[tokio::test]
async fn concurrent_resets_claim_the_task_once() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let id = create_auto_paused(&translator, &factory, 6).await;

    let (first, second) = tokio::join!(translator.reset(&id, None), translator.reset(&id, None));
    let outcomes = [first, second];

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        Err(Error::Task(TaskError::InvalidState { .. }))
    )));
    assert_eq!(
        translator.get_task(&id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn requeue_validates_state_and_providers() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let paused = create_auto_paused(&translator, &factory, 6).await;
    let pending = create(&translator, 1).await;

    assert_invalid_state(translator.retry_failed(&pending, None).await, "retry failed records of");
    assert_invalid_state(translator.reset(&pending, None).await, "reset");

    assert!(matches!(
        translator.reset(&paused, Some(vec![])).await,
        Err(Error::Task(TaskError::InvalidProviders { .. }))
    ));
    assert_eq!(
        translator.get_task(&paused).await.unwrap().status,
        TaskStatus::Paused,
        "a rejected request changes nothing"
    );
}

#[tokio::test]
async fn requeue_and_purge_wait_for_the_execution_to_end() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let gate = factory.install_gate();
    let id = create(&translator, 2).await;

    translator.run_scheduling_cycle().await.unwrap();
    gate.wait_started().await;
    translator.pause(&id).await.unwrap();

    assert!(matches!(
        translator.reset(&id, None).await,
        Err(Error::Task(TaskError::StillExecuting { .. }))
    ));
    assert!(matches!(
        translator.purge_task(&id).await,
        Err(Error::Task(TaskError::StillExecuting { .. }))
    ));

    gate.release(100);
    settle(&translator).await;

    translator.reset(&id, None).await.unwrap();
    translator.purge_task(&id).await.unwrap();
    assert!(translator.db.get_task(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_cancels_a_live_execution() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let gate = factory.install_gate();
    let id = create(&translator, 3).await;

    translator.run_scheduling_cycle().await.unwrap();
    gate.wait_started().await;

    translator.delete_task(&id).await.unwrap();
    gate.release(100);
    settle(&translator).await;

    let task = translator.db.get_task(&id).await.unwrap().unwrap();
    assert!(task.deleted);
    assert_eq!(task.completed_count, 1);
    assert_eq!(translator.scheduler_status().await.running_tasks, 0);

    assert!(matches!(
        translator.delete_task(&id).await,
        Err(Error::Task(TaskError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn purge_removes_task_and_records() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;
    let id = create(&translator, 2).await;

    translator.delete_task(&id).await.unwrap();
    translator.purge_task(&id).await.unwrap();

    assert!(translator.db.get_task(&id).await.unwrap().is_none());
    assert!(translator.db.list_records(&id).await.unwrap().is_empty());
    assert!(matches!(
        translator.purge_task(&id).await,
        Err(Error::Task(TaskError::NotFound { .. }))
    ));
}
