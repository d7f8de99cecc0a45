use std::sync::Arc;
use std::time::Duration;
use chrono::NaiveDate;
use wayfare_api::{app, AppState};
use wayfare_core::{
    BookingService, Clock, DateRange, HoldReply, HoldStatus, ItemType, PaymentService,
    PaymentStatus, PriceBasis, Promotion, SessionContext, SystemClock, UnitDescriptor,
};
use wayfare_order::{BookingRequest, Handshake, HandshakeConfig, Phase, PollerConfig, Settlement};
use wayfare_store::wire::PaymentStatusResponse;
use wayfare_store::{HttpBookingClient, MemoryBookingService, MemoryConfig};

fn june(start: u32, end: u32) -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2024, 6, start).unwrap(),
        NaiveDate::from_ymd_opt(2024, 6, end).unwrap(),
    ).unwrap()
}

struct Sandbox {
    base_url: String,
    backend: Arc<MemoryBookingService>,
}

/// Serve a seeded memory backend on an ephemeral port
async fn spawn_sandbox() -> Sandbox {
    let backend = Arc::new(MemoryBookingService::new(Arc::new(SystemClock), MemoryConfig::default()));
    backend.add_unit(UnitDescriptor {
        unit_id: "R".to_string(),
        item_type: ItemType::Room,
        name: "Deluxe Double".to_string(),
        price: PriceBasis::PerNight(250_000),
    }).unwrap();
    backend.add_unit(UnitDescriptor {
        unit_id: "ad-1".to_string(),
        item_type: ItemType::TourAd,
        name: "Home banner".to_string(),
        price: PriceBasis::Flat(1_200_000),
    }).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(AppState::new(backend.clone()));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Sandbox { base_url: format!("http://{}", addr), backend }
}

fn client(sandbox: &Sandbox) -> Arc<HttpBookingClient> {
    Arc::new(HttpBookingClient::new(&sandbox.base_url, Duration::from_secs(5)).unwrap())
}

fn handshake(remote: Arc<HttpBookingClient>, traveler: &str) -> Handshake {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let config = HandshakeConfig {
        poller: PollerConfig {
            interval: Duration::from_millis(100),
            ceiling: Duration::from_secs(10),
        },
        ..HandshakeConfig::default()
    };
    Handshake::new(SessionContext::anonymous(traveler), remote.clone(), remote, clock, config)
}

#[tokio::test]
async fn test_handshake_confirms_over_http() {
    let sandbox = spawn_sandbox().await;
    let remote = client(&sandbox);
    let mut handshake = handshake(remote.clone(), "t-1");

    let request = BookingRequest {
        item_type: ItemType::Room,
        range: june(1, 3),
        promotion: Some(Promotion::percent(10)),
    };
    let candidates = handshake.resolve(request).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].quote.gross, 500_000);

    let hold_id = handshake.select("R").await.unwrap().hold_id.clone();
    let session = handshake.open_payment().await.unwrap();
    assert_eq!(session.amount, 450_000);
    assert!(session.qr_payload.is_some());
    let payment_id = session.payment_id.clone();

    // the provider callback arrives while the poller is running
    let complete_url = format!("{}/v1/sandbox/payments/{}/complete", sandbox.base_url, payment_id);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        let body: PaymentStatusResponse = reqwest::Client::new()
            .post(complete_url)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.status, PaymentStatus::Completed);
    });

    let settlement = handshake.settle().await.unwrap();
    match settlement {
        Settlement::Confirmed { hold, payment_id: paid, reverified } => {
            assert_eq!(hold.hold_id, hold_id);
            assert_eq!(paid, payment_id);
            assert!(!reverified);
        }
        other => panic!("expected confirmation, got {:?}", other),
    }
    assert_eq!(remote.verify_hold(&hold_id).await.unwrap(), HoldStatus::Confirmed);
    assert_eq!(sandbox.backend.hold_owner(&hold_id).as_deref(), Some("t-1"));
}

#[tokio::test]
async fn test_overlapping_hold_conflicts_over_http() {
    let sandbox = spawn_sandbox().await;
    let remote = client(&sandbox);
    let first = SessionContext::anonymous("t-1");
    let second = SessionContext::anonymous("t-2");

    let reply = remote.create_hold(&first, "R", june(1, 3), None).await.unwrap();
    assert!(matches!(reply, HoldReply::Held { .. }));

    let reply = remote.create_hold(&second, "R", june(2, 4), None).await.unwrap();
    assert_eq!(reply, HoldReply::Conflict { conflicts: vec![june(1, 3)] });

    let adjacent = remote.create_hold(&second, "R", june(3, 4), None).await.unwrap();
    assert!(matches!(adjacent, HoldReply::Held { .. }));
}

#[tokio::test]
async fn test_cancel_releases_hold_and_payment() {
    let sandbox = spawn_sandbox().await;
    let remote = client(&sandbox);
    let mut handshake = handshake(remote.clone(), "t-1");

    let request = BookingRequest { item_type: ItemType::TourAd, range: june(10, 17), promotion: None };
    handshake.resolve(request).await.unwrap();
    let hold_id = handshake.select("ad-1").await.unwrap().hold_id.clone();
    let session = handshake.open_payment().await.unwrap();
    assert_eq!(session.amount, 1_200_000);
    let payment_id = session.payment_id.clone();

    let cancel = handshake.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
    });
    let settlement = handshake.settle().await.unwrap();

    assert_eq!(settlement, Settlement::Cancelled { hold_id: Some(hold_id.clone()) });
    assert_eq!(handshake.phase(), Phase::Cancelled);
    assert_eq!(remote.payment_status(&payment_id).await.unwrap(), PaymentStatus::Cancelled);
    assert_eq!(remote.verify_hold(&hold_id).await.unwrap(), HoldStatus::Released);
}

#[tokio::test]
async fn test_unknown_hold_maps_to_not_found() {
    let sandbox = spawn_sandbox().await;
    let remote = client(&sandbox);

    let err = remote.verify_hold("hold_missing").await.unwrap_err();
    assert!(matches!(err, wayfare_core::HandshakeError::NotFound(_)));
    let err = remote.create_payment("hold_missing", 100).await.unwrap_err();
    assert!(!err.is_transient());
}
