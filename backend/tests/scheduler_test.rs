mod common;

use std::time::Duration;

use common::*;
use registrar::models::NotificationChannel;
use registrar::services::NotificationSweeper;

#[tokio::test]
async fn test_sweeper_initialization() {
    let h = harness().await;

    // construct only, never started
    let _sweeper = NotificationSweeper::new(h.state.enrollment.clone(), 10);
    assert!(h.dispatcher.sent().is_empty());
}

#[tokio::test]
async fn test_sweeper_short_interval() {
    let h = harness().await;
    let course = add_course(&h.state, "OPEN", 2, vec![], vec![]).await;
    let waiter = add_student(&h.state, "Waiter").await;

    // subscribing while seats are free only gets a notice from the sweep
    h.state
        .enrollment
        .subscribe(&waiter.id, &course.id, NotificationChannel::Email)
        .await
        .expect("subscribe");
    assert!(h.dispatcher.sent().is_empty());

    let sweeper = NotificationSweeper::new(h.state.enrollment.clone(), 1);
    let sweeper_task = tokio::spawn(async move {
        sweeper.start().await;
    });

    // long enough for two sweeps
    tokio::time::sleep(Duration::from_millis(2500)).await;
    sweeper_task.abort();

    // repeated sweeps still notify once
    let sent = h.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].student_id, waiter.id);
}
