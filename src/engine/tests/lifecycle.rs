use super::*;
use crate::config::Config;
use crate::provider::ProviderFactory;
use std::sync::Arc;

#[tokio::test]
async fn startup_restores_interrupted_work() {
    let (translator, factory, temp_dir) = create_test_translator().await;
    let id = translator
        .create_task(new_task(vec![provider_config("p1", 1)], 2))
        .await
        .unwrap();

    // Simulate a crash mid-execution
    assert!(
        translator
            .db
            .transition_status(&id, TaskStatus::Pending, TaskStatus::Running)
            .await
            .unwrap()
    );
    let mut record = translator.db.get_record(&id, 1).await.unwrap().unwrap();
    record.status = RecordStatus::Translating;
    translator.db.save_record(&id, &record).await.unwrap();

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("test.db");
    let factory: Arc<dyn ProviderFactory> = factory;
    let restarted = BiblioTranslator::with_provider_factory(config, factory)
        .await
        .unwrap();

    let task = restarted.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    let record = restarted.db.get_record(&id, 1).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
}

#[tokio::test]
async fn shutdown_leaves_interrupted_task_pending() {
    let (translator, factory, _temp_dir) = create_test_translator().await;
    let gate = factory.install_gate();
    let id = translator
        .create_task(new_task(vec![provider_config("p1", 1)], 3))
        .await
        .unwrap();

    translator.run_scheduling_cycle().await.unwrap();
    gate.wait_started().await;

    let shutdown = tokio::spawn({
        let translator = translator.clone();
        async move { translator.shutdown().await }
    });
    while !translator.scheduler.shutdown_token.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    gate.release(100);
    shutdown.await.unwrap().unwrap();

    let task = translator.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.completed_count, 1);
    assert!(translator.scheduler.live_tasks.lock().await.is_empty());
    assert_eq!(translator.scheduler_status().await.running_tasks, 0);
}

#[tokio::test]
async fn shutdown_aborts_executions_past_the_timeout() {
    let (translator, factory, _temp_dir) = create_test_translator_with(|config| {
        config.scheduler.shutdown_timeout = Duration::from_millis(100);
    })
    .await;
    let gate = factory.install_gate();
    let id = translator
        .create_task(new_task(vec![provider_config("p1", 1)], 2))
        .await
        .unwrap();

    translator.run_scheduling_cycle().await.unwrap();
    gate.wait_started().await;

    // The gate is never opened
    translator.shutdown().await.unwrap();

    let task = translator.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    let record = translator.db.get_record(&id, 1).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(translator.scheduler_status().await.running_tasks, 0);
    assert!(translator.scheduler_status().await.scheduled.is_empty());
}

#[tokio::test]
async fn nothing_is_accepted_after_shutdown() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;
    translator.start().await.unwrap();
    translator.shutdown().await.unwrap();

    assert!(matches!(translator.start().await, Err(Error::ShuttingDown)));
    assert!(matches!(
        translator
            .create_task(new_task(vec![provider_config("p1", 1)], 1))
            .await,
        Err(Error::ShuttingDown)
    ));
    assert_eq!(translator.run_scheduling_cycle().await.unwrap(), 0);
}

#[tokio::test]
async fn start_is_idempotent() {
    let (translator, _factory, _temp_dir) = create_test_translator().await;

    translator.start().await.unwrap();
    translator.start().await.unwrap();
    assert!(translator.scheduler_status().await.running);

    translator.shutdown().await.unwrap();
}
