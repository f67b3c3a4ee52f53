use std::sync::Arc;

use courier_dispatch::config::Config;
use courier_dispatch::events::DispatchEvent;
use courier_dispatch::hub::{CloseReason, ObserverEvent};
use courier_dispatch::models::bid::BidStatus;
use courier_dispatch::models::delivery::{DeliveryStatus, GeoPoint, NewDelivery, Stop};
use courier_dispatch::models::principal::Principal;
use courier_dispatch::state::AppState;
use courier_dispatch::store::{InMemoryJobStore, JobStore};
use uuid::Uuid;

fn new_job(price: i64) -> NewDelivery {
    NewDelivery {
        pickup: Stop {
            location: GeoPoint { lat: 5.32, lng: -4.02 },
            address: "Plateau, Abidjan".to_string(),
        },
        dropoff: Stop {
            location: GeoPoint { lat: 5.36, lng: -3.98 },
            address: "Cocody, Abidjan".to_string(),
        },
        proposed_price: price,
    }
}

fn setup() -> Arc<AppState> {
    Arc::new(AppState::in_memory(&Config::default()))
}

#[tokio::test]
async fn auction_to_completion() {
    let state = setup();
    let mut events = state.dispatch_events_tx.subscribe();
    let client = Principal::client(Uuid::new_v4());
    let c1 = Principal::courier(Uuid::new_v4());
    let c2 = Principal::courier(Uuid::new_v4());

    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();
    assert_eq!(job.status, DeliveryStatus::Pending);
    assert!(job.route.duration_secs > 0);

    let b1 = state
        .dispatcher
        .submit_bid(job.id, &c1, 1_800, "on my way".to_string())
        .await
        .unwrap();
    let bidding = state.dispatcher.get_delivery(job.id, &client).await.unwrap();
    assert_eq!(bidding.status, DeliveryStatus::Bidding);
    state
        .dispatcher
        .submit_bid(job.id, &c2, 1_900, String::new())
        .await
        .unwrap();

    let accepted = state.dispatcher.accept_bid(job.id, b1.id, &client).await.unwrap();
    assert_eq!(accepted.status, DeliveryStatus::Accepted);
    assert_eq!(accepted.courier_id, Some(c1.id));
    assert_eq!(accepted.final_price, Some(1_800));
    assert!(accepted.accepted_at.is_some());

    let mut watcher = state.hub.attach(job.id, client).await.unwrap();
    state
        .hub
        .publish_position(job.id, &c1, GeoPoint { lat: 5.32, lng: -4.02 })
        .await
        .unwrap();
    match watcher.recv().await {
        Some(ObserverEvent::Position(sample)) => {
            assert_eq!(sample.point(), GeoPoint { lat: 5.32, lng: -4.02 });
        }
        other => panic!("expected a position, got {other:?}"),
    }

    for target in [DeliveryStatus::InProgress, DeliveryStatus::Delivered] {
        state.dispatcher.advance_status(job.id, target, &c1).await.unwrap();
    }
    let done = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::Completed, &client)
        .await
        .unwrap();
    assert!(matches!(
        watcher.recv().await,
        Some(ObserverEvent::Closed(CloseReason::Completed))
    ));
    assert_eq!(state.hub.tracked_deliveries(), 0);
    assert_eq!(done.status, DeliveryStatus::Completed);
    assert!(done.picked_up_at.is_some());
    assert!(done.delivered_at.is_some());
    assert!(done.completed_at.is_some());
    assert!(done.execution_secs.is_some_and(|secs| secs >= 0));

    let bids = state.dispatcher.list_bids(job.id, &client).await.unwrap();
    for bid in bids {
        let expected = if bid.id == b1.id {
            BidStatus::Accepted
        } else {
            BidStatus::Rejected
        };
        assert_eq!(bid.status, expected);
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(DispatchEvent::JobCreated { .. })));
    assert!(seen
        .iter()
        .any(|event| matches!(event, DispatchEvent::BidAccepted { courier_id, .. } if *courier_id == c1.id)));
    assert!(seen.iter().any(|event| matches!(
        event,
        DispatchEvent::StatusChanged { to: DeliveryStatus::Completed, .. }
    )));
}

#[tokio::test]
async fn price_below_floor_persists_nothing() {
    let store = Arc::new(InMemoryJobStore::new());
    let shared: Arc<dyn JobStore> = store.clone();
    let state = AppState::new(&Config::default(), shared, None);
    let client = Principal::client(Uuid::new_v4());

    let err = state.dispatcher.create(&client, new_job(400)).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert_eq!(store.delivery_count(), 0);

    state.dispatcher.create(&client, new_job(500)).await.unwrap();
    assert_eq!(store.delivery_count(), 1);
}

#[tokio::test]
async fn resubmitting_updates_the_existing_bid() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();

    let first = state
        .dispatcher
        .submit_bid(job.id, &courier, 1_900, String::new())
        .await
        .unwrap();
    let second = state
        .dispatcher
        .submit_bid(job.id, &courier, 1_700, "cheaper".to_string())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.amount, 1_700);
    assert_eq!(second.note, "cheaper");

    let bids = state.dispatcher.list_bids(job.id, &client).await.unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].amount, 1_700);
}

#[tokio::test]
async fn bids_after_acceptance_are_refused() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let winner = Principal::courier(Uuid::new_v4());
    let late = Principal::courier(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();

    let bid = state
        .dispatcher
        .submit_bid(job.id, &winner, 1_500, String::new())
        .await
        .unwrap();
    state.dispatcher.accept_bid(job.id, bid.id, &client).await.unwrap();

    let err = state
        .dispatcher
        .submit_bid(job.id, &late, 1_000, String::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let err = state
        .dispatcher
        .submit_bid(job.id, &winner, 1_000, String::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let delivery = state.dispatcher.get_delivery(job.id, &client).await.unwrap();
    assert_eq!(delivery.final_price, Some(1_500));
}

#[tokio::test]
async fn accept_requires_the_owning_client_and_a_bid_on_the_job() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let other_client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();
    let other_job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();

    let bid = state
        .dispatcher
        .submit_bid(job.id, &courier, 1_500, String::new())
        .await
        .unwrap();
    state
        .dispatcher
        .submit_bid(other_job.id, &courier, 1_500, String::new())
        .await
        .unwrap();

    let err = state
        .dispatcher
        .accept_bid(job.id, bid.id, &other_client)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "permission_denied");

    let err = state
        .dispatcher
        .accept_bid(other_job.id, bid.id, &client)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let err = state
        .dispatcher
        .accept_bid(job.id, bid.id, &Principal::courier(courier.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "permission_denied");
}

#[tokio::test]
async fn accept_on_a_pending_job_conflicts() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();

    let err = state.dispatcher.accept_bid(job.id, 1, &client).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_acceptances_have_a_single_winner() {
    for _ in 0..20 {
        let state = setup();
        let client = Principal::client(Uuid::new_v4());
        let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();

        let mut bids = Vec::new();
        for amount in [1_500, 1_600, 1_700, 1_800] {
            let courier = Principal::courier(Uuid::new_v4());
            let bid = state
                .dispatcher
                .submit_bid(job.id, &courier, amount, String::new())
                .await
                .unwrap();
            bids.push(bid);
        }

        let attempts: Vec<_> = bids
            .iter()
            .map(|bid| {
                let state = state.clone();
                let (job_id, bid_id) = (job.id, bid.id);
                tokio::spawn(async move { state.dispatcher.accept_bid(job_id, bid_id, &client).await })
            })
            .collect();

        let mut winners = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(delivery) => winners.push(delivery),
                Err(err) => assert_eq!(err.kind(), "conflict"),
            }
        }
        assert_eq!(winners.len(), 1);

        let stored = state.dispatcher.get_delivery(job.id, &client).await.unwrap();
        assert_eq!(stored.courier_id, winners[0].courier_id);
        assert_eq!(stored.final_price, winners[0].final_price);

        let ledger = state.dispatcher.list_bids(job.id, &client).await.unwrap();
        let accepted = ledger
            .iter()
            .filter(|bid| bid.status == BidStatus::Accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bids_are_all_recorded() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let state = state.clone();
            let job_id = job.id;
            tokio::spawn(async move {
                let courier = Principal::courier(Uuid::new_v4());
                state
                    .dispatcher
                    .submit_bid(job_id, &courier, 1_000 + i, String::new())
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let bids = state.dispatcher.list_bids(job.id, &client).await.unwrap();
    assert_eq!(bids.len(), 16);
    let delivery = state.dispatcher.get_delivery(job.id, &client).await.unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Bidding);
}

#[tokio::test]
async fn only_the_assigned_courier_advances_the_job() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let stranger = Principal::courier(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();
    let bid = state
        .dispatcher
        .submit_bid(job.id, &courier, 1_500, String::new())
        .await
        .unwrap();
    state.dispatcher.accept_bid(job.id, bid.id, &client).await.unwrap();

    let err = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::InProgress, &stranger)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "permission_denied");

    // Clients cannot mark a pickup even on their own job.
    let err = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::InProgress, &client)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");

    let err = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::Delivered, &courier)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
}

#[tokio::test]
async fn client_cancel_rejects_pending_bids() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();
    state
        .dispatcher
        .submit_bid(job.id, &courier, 1_500, String::new())
        .await
        .unwrap();

    let cancelled = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::Cancelled, &client)
        .await
        .unwrap();
    assert_eq!(cancelled.status, DeliveryStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(cancelled.courier_id, None);

    let bids = state.dispatcher.list_bids(job.id, &client).await.unwrap();
    assert!(bids.iter().all(|bid| bid.status == BidStatus::Rejected));

    let err = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::Pending, &Principal::operator(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
}

#[tokio::test]
async fn operator_may_rewind_an_assigned_job() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let operator = Principal::operator(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();
    state
        .dispatcher
        .assign_courier(job.id, courier.id, 1_200, &operator)
        .await
        .unwrap();
    state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::InProgress, &courier)
        .await
        .unwrap();

    let rewound = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::Accepted, &operator)
        .await
        .unwrap();
    assert_eq!(rewound.status, DeliveryStatus::Accepted);
    assert_eq!(rewound.courier_id, Some(courier.id));
    assert_eq!(rewound.final_price, Some(1_200));

    // Rewinding past assignment would orphan the courier and price.
    let err = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::Bidding, &operator)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
}

#[tokio::test]
async fn rewind_clears_milestones_of_the_undone_pass() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let operator = Principal::operator(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();
    state
        .dispatcher
        .assign_courier(job.id, courier.id, 1_200, &operator)
        .await
        .unwrap();
    for target in [DeliveryStatus::InProgress, DeliveryStatus::Delivered] {
        state
            .dispatcher
            .advance_status(job.id, target, &courier)
            .await
            .unwrap();
    }

    let back = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::InProgress, &operator)
        .await
        .unwrap();
    assert!(back.picked_up_at.is_some());
    assert!(back.delivered_at.is_none());

    let back = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::Accepted, &operator)
        .await
        .unwrap();
    assert!(back.accepted_at.is_some());
    assert!(back.picked_up_at.is_none());
    assert!(back.delivered_at.is_none());

    // A second pass records fresh milestones.
    let again = state
        .dispatcher
        .advance_status(job.id, DeliveryStatus::InProgress, &courier)
        .await
        .unwrap();
    assert!(again.picked_up_at.is_some_and(|at| at >= back.updated_at));
}

#[tokio::test]
async fn visibility_follows_the_parties_of_the_job() {
    let state = setup();
    let client = Principal::client(Uuid::new_v4());
    let stranger = Principal::client(Uuid::new_v4());
    let courier = Principal::courier(Uuid::new_v4());
    let bystander = Principal::courier(Uuid::new_v4());
    let job = state.dispatcher.create(&client, new_job(2_000)).await.unwrap();

    // Any courier may inspect a job still collecting bids.
    assert!(state.dispatcher.get_delivery(job.id, &bystander).await.is_ok());
    assert_eq!(
        state
            .dispatcher
            .get_delivery(job.id, &stranger)
            .await
            .unwrap_err()
            .kind(),
        "permission_denied"
    );

    let bid = state
        .dispatcher
        .submit_bid(job.id, &courier, 1_500, String::new())
        .await
        .unwrap();
    state.dispatcher.accept_bid(job.id, bid.id, &client).await.unwrap();

    assert!(state.dispatcher.get_delivery(job.id, &courier).await.is_ok());
    assert_eq!(
        state
            .dispatcher
            .get_delivery(job.id, &bystander)
            .await
            .unwrap_err()
            .kind(),
        "permission_denied"
    );

    let open = state.dispatcher.list_open(&bystander).await.unwrap();
    assert!(open.iter().all(|delivery| delivery.id != job.id));
}
