//! Concurrency and load tests for the resilience engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Barrier};

use scan_resilience::clock::MockClock;
use scan_resilience::{
    Alert, AlertManager, AlertSeverity, CircuitBreaker, CircuitBreakerConfig, CircuitState, Context,
    DegradationLevel, DegradationManager, Error,
};

mod common;

use common::RecordingHandler;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_breaker_bookkeeping_under_load() {
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::new("semgrep").with_ready_to_trip(|_| false),
    ));

    let concurrency = 20;
    let calls_per_task = 50;
    let start = Instant::now();

    let mut tasks = Vec::new();
    for i in 0..concurrency {
        let breaker = breaker.clone();
        tasks.push(tokio::spawn(async move {
            for j in 0..calls_per_task {
                let fail = (i + j) % 2 == 0;
                let _ = breaker
                    .call(|| async move {
                        tokio::task::yield_now().await;
                        if fail {
                            Err(common::timeout_error())
                        } else {
                            Ok(())
                        }
                    })
                    .await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let counts = breaker.counts();
    let total = (concurrency * calls_per_task) as u32;
    assert_eq!(counts.requests, total);
    assert_eq!(counts.total_successes + counts.total_failures, total);
    assert_eq!(counts.total_failures, total / 2);
    assert_eq!(breaker.state(), CircuitState::Closed);

    println!("{} breaker calls in {:?}", total, start.elapsed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_half_open_admits_exactly_max_requests() {
    let clock = Arc::new(MockClock::new());
    let breaker = Arc::new(CircuitBreaker::with_clock(
        CircuitBreakerConfig::new("github")
            .with_max_requests(3)
            .with_timeout(Duration::from_secs(5))
            .with_ready_to_trip(|counts| counts.consecutive_failures >= 1),
        clock.clone(),
    ));

    let _ = breaker.call(|| async { Err::<(), _>(common::external_error()) }).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    clock.advance(Duration::from_secs(6));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let concurrency = 20;
    let barrier = Arc::new(Barrier::new(concurrency));
    let (release_tx, release_rx) = watch::channel(false);
    let rejected = Arc::new(AtomicU32::new(0));

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let breaker = breaker.clone();
        let barrier = barrier.clone();
        let rejected = rejected.clone();
        let mut release = release_rx.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            let result = breaker
                .call(|| async move {
                    let _ = release.wait_for(|released| *released).await;
                    Ok(())
                })
                .await;
            if let Err(Error::CircuitOpen(e)) = &result {
                assert_eq!(e.state, CircuitState::HalfOpen);
                rejected.fetch_add(1, Ordering::SeqCst);
            }
            result.is_ok()
        }));
    }

    while rejected.load(Ordering::SeqCst) < (concurrency as u32 - 3) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    release_tx.send_replace(true);

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_degradation_updates_from_many_tasks() {
    let manager = Arc::new(DegradationManager::new());
    let services: Vec<String> = (0..8).map(|i| format!("agent-{i}")).collect();
    for name in &services {
        manager.register_service(name, DegradationLevel::Normal);
    }

    let mut tasks = Vec::new();
    for (i, name) in services.iter().cloned().enumerate() {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..100 {
                // Even agents end unhealthy, odd agents end healthy.
                manager.update_service_health(&name, i % 2 == 1, Duration::from_millis(5), "health check");
                let _ = manager.current_degradation_level();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(manager.unhealthy_services().len(), 4);
    assert_eq!(manager.healthy_services().len(), 4);
    assert_eq!(manager.current_degradation_level(), DegradationLevel::Severe);
    for name in manager.unhealthy_services() {
        assert_eq!(manager.service_health(&name).unwrap().error_count, 100);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_limit_is_exact_under_concurrency() {
    let alerts = Arc::new(AlertManager::new().with_rate_limit(100, Duration::from_secs(3600)));
    let recorder = RecordingHandler::new("recorder");
    alerts.add_handler(recorder.clone());

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let alerts = alerts.clone();
        tasks.push(tokio::spawn(async move {
            let mut limited = 0u32;
            for _ in 0..50 {
                let alert = Alert::new(AlertSeverity::Warning, "Operation Timeout", "scanner");
                if let Err(Error::AlertRateLimited { .. }) = alerts.send_alert(&Context::background(), alert).await {
                    limited += 1;
                }
            }
            limited
        }));
    }

    let mut limited = 0;
    for task in tasks {
        limited += task.await.unwrap();
    }

    assert_eq!(recorder.count(), 100);
    assert_eq!(limited, 400);
}
