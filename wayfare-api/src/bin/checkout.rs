//! Runs one reservation attempt against the configured booking service:
//! `checkout <ROOM|TOUR_AD> <start> <end> [percent-off]`.

use std::sync::Arc;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfare_core::{Clock, DateRange, ItemType, Promotion, SessionContext, SystemClock};
use wayfare_order::{BookingRequest, Handshake, HandshakeConfig, Phase};
use wayfare_store::app_config::Config;
use wayfare_store::HttpBookingClient;

fn parse_request(args: &[String]) -> anyhow::Result<BookingRequest> {
    if args.len() < 3 {
        bail!("usage: checkout <ROOM|TOUR_AD> <start> <end> [percent-off]");
    }
    let item_type = match args[0].as_str() {
        "ROOM" => ItemType::Room,
        "TOUR_AD" => ItemType::TourAd,
        other => bail!("unknown item type {}", other),
    };
    let start: NaiveDate = args[1].parse().context("start date")?;
    let end: NaiveDate = args[2].parse().context("end date")?;
    let promotion = match args.get(3) {
        Some(percent) => Some(Promotion::percent(percent.parse().context("percent-off")?)),
        None => None,
    };

    Ok(BookingRequest {
        item_type,
        range: DateRange::new(start, end)?,
        promotion,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wayfare_order=debug,wayfare_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let request = parse_request(&args)?;
    let config = Config::load().context("Failed to load config")?;

    let traveler = std::env::var("WAYFARE_TRAVELER").unwrap_or_else(|_| "guest".to_string());
    let ctx = match std::env::var("WAYFARE_TOKEN") {
        Ok(token) => SessionContext::login(traveler, token),
        Err(_) => SessionContext::anonymous(traveler),
    };
    let remote = Arc::new(
        HttpBookingClient::new(&config.remote.base_url, config.remote.timeout())?.with_session(&ctx),
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut handshake = Handshake::new(
        ctx,
        remote.clone(),
        remote,
        clock,
        HandshakeConfig::from(&config.handshake),
    );

    let candidates = handshake.resolve(request).await?;
    let Some(cheapest) = candidates.iter().min_by_key(|c| c.quote.net) else {
        println!("Nothing available for those dates");
        return Ok(());
    };
    let unit_id = cheapest.unit.unit_id.clone();
    println!("Reserving {} ({})", cheapest.unit.name, unit_id);

    let hold = handshake.select(&unit_id).await?;
    println!("Hold {} until {}: {} {}", hold.hold_id, hold.expires_at, hold.amount_due, hold.currency);

    let session = handshake.open_payment().await?;
    if let Some(url) = &session.checkout_url {
        println!("Pay at {}", url);
    }
    if let Some(qr) = &session.qr_payload {
        println!("QR payload: {}", qr);
    }

    let cancel = handshake.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    if let Some(mut remaining) = handshake.remaining() {
        tokio::spawn(async move {
            while remaining.changed().await.is_ok() {
                let secs = *remaining.borrow();
                if secs % 30 == 0 {
                    println!("{}s left", secs);
                }
            }
        });
    }

    let settlement = handshake.settle().await?;
    println!("{}", settlement.message());
    if handshake.phase() != Phase::Confirmed {
        std::process::exit(1);
    }
    Ok(())
}
