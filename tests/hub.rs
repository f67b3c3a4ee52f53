use std::sync::Arc;
use std::time::Duration;

use courier_dispatch::config::Config;
use courier_dispatch::fanout::{FanoutBridge, InProcessBus};
use courier_dispatch::hub::{AttachRefusal, CloseReason, ObserverEvent, Subscription};
use courier_dispatch::models::delivery::{DeliveryId, DeliveryStatus, GeoPoint, NewDelivery, Stop};
use courier_dispatch::models::principal::Principal;
use courier_dispatch::state::AppState;
use courier_dispatch::store::{InMemoryJobStore, JobStore};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

fn new_job() -> NewDelivery {
    NewDelivery {
        pickup: Stop {
            location: GeoPoint { lat: 52.51, lng: 13.39 },
            address: "Alexanderplatz 1".to_string(),
        },
        dropoff: Stop {
            location: GeoPoint { lat: 52.54, lng: 13.42 },
            address: "Schonhauser Allee 80".to_string(),
        },
        proposed_price: 1_500,
    }
}

/// Posts a job and assigns `courier` to it, leaving it in a live status.
async fn live_job(state: &AppState, client: &Principal, courier: &Principal) -> DeliveryId {
    let job = state.dispatcher.create(client, new_job()).await.unwrap();
    let operator = Principal::operator(Uuid::new_v4());
    state
        .dispatcher
        .assign_courier(job.id, courier.id, 1_000, &operator)
        .await
        .unwrap();
    job.id
}

async fn next_position(subscription: &mut Subscription) -> GeoPoint {
    match timeout(WAIT, subscription.recv()).await {
        Ok(Some(ObserverEvent::Position(sample))) => sample.point(),
        other => panic!("expected a position, got {other:?}"),
    }
}

async fn next_close(subscription: &mut Subscription) -> CloseReason {
    match timeout(WAIT, subscription.recv()).await {
        Ok(Some(ObserverEvent::Closed(reason))) => reason,
        other => panic!("expected a close, got {other:?}"),
    }
}

fn point(lat: f64) -> GeoPoint {
    GeoPoint { lat, lng: 13.40 }
}

#[tokio::test]
async fn publish_reaches_every_observer_once() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let operator = Principal::operator(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut client_feed = state.hub.attach(id, client).await.unwrap();
    let mut operator_feed = state.hub.attach(id, operator).await.unwrap();
    let mut courier_feed = state.hub.attach(id, courier).await.unwrap();
    assert_eq!(state.hub.observer_count(id).await, 3);

    state
        .hub
        .publish_position(id, &courier, point(52.52))
        .await
        .unwrap();

    for feed in [&mut client_feed, &mut operator_feed, &mut courier_feed] {
        assert_eq!(next_position(feed).await, point(52.52));
        assert!(matches!(feed.try_recv(), Err(TryRecvError::Empty)));
    }
}

#[tokio::test]
async fn repeated_sample_is_delivered_each_time() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut feed = state.hub.attach(id, client).await.unwrap();
    for _ in 0..2 {
        state.hub.publish_position(id, &courier, point(52.52)).await.unwrap();
    }

    assert_eq!(next_position(&mut feed).await, point(52.52));
    assert_eq!(next_position(&mut feed).await, point(52.52));
    assert!(matches!(feed.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn only_parties_of_a_live_job_may_attach() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let stranger = Principal::client(Uuid::new_v4());
    let other_courier = Principal::courier(Uuid::new_v4());
    assert_eq!(
        state.hub.attach(id, stranger).await.unwrap_err(),
        AttachRefusal::Forbidden
    );
    assert_eq!(
        state.hub.attach(id, other_courier).await.unwrap_err(),
        AttachRefusal::Forbidden
    );
    assert_eq!(
        state.hub.attach(404, client).await.unwrap_err(),
        AttachRefusal::NotFound
    );

    let pending = state.dispatcher.create(&client, new_job()).await.unwrap();
    assert_eq!(
        state.hub.attach(pending.id, client).await.unwrap_err(),
        AttachRefusal::Inactive
    );

    // Refusals leave no empty channel behind.
    assert_eq!(state.hub.tracked_deliveries(), 0);
}

#[tokio::test]
async fn reattach_replays_the_latest_position() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut feed = state.hub.attach(id, client).await.unwrap();
    state.hub.publish_position(id, &courier, point(52.52)).await.unwrap();
    state.hub.publish_position(id, &courier, point(52.53)).await.unwrap();
    assert_eq!(next_position(&mut feed).await, point(52.52));
    assert_eq!(next_position(&mut feed).await, point(52.53));

    assert!(state.hub.detach(id, client.id).await);
    assert_eq!(state.hub.tracked_deliveries(), 0);
    assert!(timeout(WAIT, feed.recv()).await.unwrap().is_none());

    // The channel is gone; the replay comes from the job store.
    let mut feed = state.hub.attach(id, client).await.unwrap();
    assert_eq!(next_position(&mut feed).await, point(52.53));
    assert!(matches!(feed.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn second_connection_supersedes_the_first() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut first = state.hub.attach(id, client).await.unwrap();
    let mut second = state.hub.attach(id, client).await.unwrap();
    assert_eq!(next_close(&mut first).await, CloseReason::Superseded);
    assert_eq!(state.hub.observer_count(id).await, 1);

    // The old connection cleaning up must not remove the new one.
    assert!(!state.hub.release(id, first.connection_id).await);
    assert_eq!(state.hub.observer_count(id).await, 1);

    state.hub.publish_position(id, &courier, point(52.52)).await.unwrap();
    assert_eq!(next_position(&mut second).await, point(52.52));

    assert!(state.hub.release(id, second.connection_id).await);
    assert_eq!(state.hub.observer_count(id).await, 0);
}

#[tokio::test]
async fn publish_is_refused_for_foreign_couriers_and_finished_jobs() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let intruder = Principal::courier(Uuid::new_v4());
    let err = state
        .hub
        .publish_position(id, &intruder, point(52.52))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "permission_denied");

    let err = state
        .hub
        .publish_position(id, &courier, GeoPoint { lat: 123.0, lng: 0.0 })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    state
        .dispatcher
        .advance_status(id, DeliveryStatus::InProgress, &courier)
        .await
        .unwrap();
    state
        .dispatcher
        .advance_status(id, DeliveryStatus::Delivered, &courier)
        .await
        .unwrap();
    let err = state
        .hub
        .publish_position(id, &courier, point(52.52))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
}

#[tokio::test]
async fn terminal_status_closes_every_observer() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut client_feed = state.hub.attach(id, client).await.unwrap();
    let mut courier_feed = state.hub.attach(id, courier).await.unwrap();

    let operator = Principal::operator(Uuid::new_v4());
    state
        .dispatcher
        .advance_status(id, DeliveryStatus::Cancelled, &operator)
        .await
        .unwrap();

    assert_eq!(next_close(&mut client_feed).await, CloseReason::Cancelled);
    assert_eq!(next_close(&mut courier_feed).await, CloseReason::Cancelled);
    assert_eq!(state.hub.tracked_deliveries(), 0);
    assert_eq!(
        state.hub.attach(id, client).await.unwrap_err(),
        AttachRefusal::Inactive
    );
}

#[tokio::test]
async fn slow_observer_is_evicted_as_lagged() {
    let config = Config {
        observer_buffer_size: 1,
        ..Config::default()
    };
    let state = AppState::in_memory(&config);
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let operator = Principal::operator(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut slow = state.hub.attach(id, client).await.unwrap();
    let mut fast = state.hub.attach(id, operator).await.unwrap();

    state.hub.publish_position(id, &courier, point(52.52)).await.unwrap();
    assert_eq!(next_position(&mut fast).await, point(52.52));
    state.hub.publish_position(id, &courier, point(52.53)).await.unwrap();
    assert_eq!(next_position(&mut fast).await, point(52.53));

    assert_eq!(state.hub.observer_count(id).await, 1);
    assert_eq!(next_position(&mut slow).await, point(52.52));
    assert_eq!(next_close(&mut slow).await, CloseReason::Lagged);
    assert!(timeout(WAIT, slow.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn job_end_reaches_an_observer_with_a_full_queue() {
    let config = Config {
        observer_buffer_size: 2,
        ..Config::default()
    };
    let state = AppState::in_memory(&config);
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut feed = state.hub.attach(id, client).await.unwrap();
    state.hub.publish_position(id, &courier, point(52.50)).await.unwrap();
    state.hub.publish_position(id, &courier, point(52.51)).await.unwrap();
    assert_eq!(state.hub.observer_count(id).await, 1);

    for target in [DeliveryStatus::InProgress, DeliveryStatus::Delivered] {
        state
            .dispatcher
            .advance_status(id, target, &courier)
            .await
            .unwrap();
    }
    state
        .dispatcher
        .advance_status(id, DeliveryStatus::Completed, &client)
        .await
        .unwrap();

    assert_eq!(next_position(&mut feed).await, point(52.50));
    assert_eq!(next_position(&mut feed).await, point(52.51));
    assert_eq!(next_close(&mut feed).await, CloseReason::Completed);
    assert!(timeout(WAIT, feed.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn superseded_connection_is_told_even_when_its_queue_is_full() {
    let config = Config {
        observer_buffer_size: 1,
        ..Config::default()
    };
    let state = AppState::in_memory(&config);
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    let mut first = state.hub.attach(id, client).await.unwrap();
    state.hub.publish_position(id, &courier, point(52.52)).await.unwrap();
    let mut second = state.hub.attach(id, client).await.unwrap();

    assert_eq!(next_position(&mut first).await, point(52.52));
    assert!(matches!(
        first.try_recv(),
        Ok(ObserverEvent::Closed(CloseReason::Superseded))
    ));
    assert!(matches!(first.try_recv(), Err(TryRecvError::Disconnected)));

    // The replacement starts from the cached position.
    assert_eq!(next_position(&mut second).await, point(52.52));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_position_is_stored_once_the_job_stops_being_live() {
    let state = Arc::new(AppState::in_memory(&Config::default()));
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;
    state
        .dispatcher
        .advance_status(id, DeliveryStatus::InProgress, &courier)
        .await
        .unwrap();

    let mut publishers = Vec::new();
    for step in 0..50 {
        let state = state.clone();
        publishers.push(tokio::spawn(async move {
            state
                .hub
                .publish_position(id, &courier, point(52.50 + step as f64 * 0.001))
                .await
        }));
    }
    state
        .dispatcher
        .advance_status(id, DeliveryStatus::Delivered, &courier)
        .await
        .unwrap();

    let mut accepted = 0;
    for publisher in publishers {
        match publisher.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert_eq!(err.kind(), "conflict"),
        }
    }

    let delivery = state.dispatcher.get_delivery(id, &client).await.unwrap();
    let delivered_at = delivery.delivered_at.unwrap();
    let history = state.dispatcher.position_history(id, &client).await.unwrap();
    assert_eq!(history.len(), accepted);
    assert!(history.iter().all(|sample| sample.recorded_at <= delivered_at));
}

#[tokio::test]
async fn sweep_evicts_dead_and_unresponsive_observers() {
    let state = AppState::in_memory(&Config::default());
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let operator = Principal::operator(Uuid::new_v4());
    let id = live_job(&state, &client, &courier).await;

    // Answers every probe.
    let mut responsive = state.hub.attach(id, client).await.unwrap();
    let answering = tokio::spawn(async move {
        while let Some(event) = responsive.recv().await {
            if let ObserverEvent::Probe(ack) = event {
                let _ = ack.send(());
            }
        }
    });

    // Holds its subscription but never reads it.
    let _silent = state.hub.attach(id, operator).await.unwrap();

    // Gone without detaching.
    drop(state.hub.attach(id, courier).await.unwrap());

    let report = state.hub.sweep_once(Duration::from_millis(100)).await;
    assert_eq!(report.probed, 3);
    assert_eq!(report.evicted, 2);
    assert_eq!(state.hub.observer_count(id).await, 1);

    let report = state.hub.sweep_once(Duration::from_millis(100)).await;
    assert_eq!(report.evicted, 0);

    answering.abort();
}

fn shared_instances(store: &Arc<InMemoryJobStore>, bus: &InProcessBus) -> (Config, AppState) {
    let config = Config::default();
    let bridge: Arc<dyn FanoutBridge> = Arc::new(bus.clone());
    let store: Arc<dyn JobStore> = store.clone();
    let state = AppState::new(&config, store, Some(bridge));
    (config, state)
}

#[tokio::test]
async fn positions_cross_instances_through_the_bridge_without_echo() {
    let store = Arc::new(InMemoryJobStore::new());
    let bus = InProcessBus::new(64);
    let shutdown = CancellationToken::new();

    let (config_a, a) = shared_instances(&store, &bus);
    let (config_b, b) = shared_instances(&store, &bus);
    a.start_background(&config_a, shutdown.clone()).await.unwrap();
    b.start_background(&config_b, shutdown.clone()).await.unwrap();

    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let operator = Principal::operator(Uuid::new_v4());
    let id = live_job(&a, &client, &courier).await;

    let mut local = a.hub.attach(id, operator).await.unwrap();
    let mut remote = b.hub.attach(id, client).await.unwrap();

    a.hub.publish_position(id, &courier, point(52.52)).await.unwrap();

    assert_eq!(next_position(&mut remote).await, point(52.52));
    assert_eq!(next_position(&mut local).await, point(52.52));

    // Give the relays time to see the envelope come back around.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(local.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(remote.try_recv(), Err(TryRecvError::Empty)));

    shutdown.cancel();
}

#[tokio::test]
async fn job_end_closes_observers_on_every_instance() {
    let store = Arc::new(InMemoryJobStore::new());
    let bus = InProcessBus::new(64);
    let shutdown = CancellationToken::new();

    let (config_a, a) = shared_instances(&store, &bus);
    let (config_b, b) = shared_instances(&store, &bus);
    a.start_background(&config_a, shutdown.clone()).await.unwrap();
    b.start_background(&config_b, shutdown.clone()).await.unwrap();

    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let id = live_job(&a, &client, &courier).await;

    let mut remote = b.hub.attach(id, client).await.unwrap();

    a.dispatcher
        .advance_status(id, DeliveryStatus::InProgress, &courier)
        .await
        .unwrap();
    a.dispatcher
        .advance_status(id, DeliveryStatus::Delivered, &courier)
        .await
        .unwrap();
    a.dispatcher
        .advance_status(id, DeliveryStatus::Completed, &client)
        .await
        .unwrap();

    assert_eq!(next_close(&mut remote).await, CloseReason::Completed);
    assert_eq!(b.hub.tracked_deliveries(), 0);

    shutdown.cancel();
}
