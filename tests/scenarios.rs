//! End-to-end scenarios over the full engine: deposits, matching,
//! settlement and the journal, with literal expected balances.

mod common;

use common::*;
use exchange_core::prelude::*;

// Simple cross: one trade at 100.00 for 5 DEC, full settlement, no
// residual locks.
#[test]
fn simple_cross_settles_exactly() {
    let (engine, journal) = venue();
    fund_usd(&engine, "a", 10_000);
    fund_dec(&engine, "b", 100);

    let buy = engine
        .submit(OrderRequest::limit("a", "DEC/USD", Side::Buy, 10_000, dec(5)))
        .unwrap();
    assert!(buy.trades.is_empty());

    let sell = engine
        .submit(OrderRequest::limit("b", "DEC/USD", Side::Sell, 10_000, dec(5)))
        .unwrap();
    assert_eq!(sell.trades.len(), 1);
    let trade = &sell.trades[0];
    assert_eq!(trade.price, 10_000);
    assert_eq!(trade.quantity, dec(5));
    assert_eq!(trade.buyer(), &p("a"));
    assert_eq!(trade.seller(), &p("b"));

    let a_usd = engine.balance(&p("a"), &usd_asset());
    let a_dec = engine.balance(&p("a"), &dec_asset());
    let b_usd = engine.balance(&p("b"), &usd_asset());
    let b_dec = engine.balance(&p("b"), &dec_asset());
    assert_eq!(a_usd.available, usd(9_500));
    assert_eq!(a_dec.available, dec(5));
    assert_eq!(b_usd.available, usd(500));
    assert_eq!(b_dec.available, dec(95));
    for balance in [a_usd, a_dec, b_usd, b_dec] {
        assert_eq!(balance.locked, 0);
    }

    // journal saw both orders and the trade
    let tags: Vec<&str> = journal.events().iter().map(|e| e.kind.tag()).collect();
    assert!(tags.contains(&"TRADE"));
    assert_eq!(tags.iter().filter(|t| **t == "FILLED").count(), 2);
}

// Price-time priority: better price first, then FIFO within the level.
#[test]
fn price_time_priority_across_sellers() {
    let (engine, _journal) = venue();
    for seller in ["s1", "s2", "s3"] {
        fund_dec(&engine, seller, 10);
    }
    fund_usd(&engine, "b", 10_000);

    let first = engine
        .submit(OrderRequest::limit("s1", "DEC/USD", Side::Sell, 10_000, dec(10)))
        .unwrap();
    let second = engine
        .submit(OrderRequest::limit("s2", "DEC/USD", Side::Sell, 10_000, dec(10)))
        .unwrap();
    let third = engine
        .submit(OrderRequest::limit("s3", "DEC/USD", Side::Sell, 9_999, dec(10)))
        .unwrap();

    let buy = engine
        .submit(OrderRequest::limit("b", "DEC/USD", Side::Buy, 10_000, dec(25)))
        .unwrap();
    assert_eq!(buy.trades.len(), 3);

    assert_eq!(buy.trades[0].maker_order, third.order_id);
    assert_eq!(buy.trades[0].price, 9_999);
    assert_eq!(buy.trades[0].quantity, dec(10));

    assert_eq!(buy.trades[1].maker_order, first.order_id);
    assert_eq!(buy.trades[1].price, 10_000);
    assert_eq!(buy.trades[1].quantity, dec(10));

    assert_eq!(buy.trades[2].maker_order, second.order_id);
    assert_eq!(buy.trades[2].price, 10_000);
    assert_eq!(buy.trades[2].quantity, dec(5));

    // s2 keeps 5 DEC resting at 100.00
    let depth = engine.depth(&sym(), 5).unwrap();
    assert_eq!(depth.asks.len(), 1);
    assert_eq!(depth.asks[0].price, 10_000);
    assert_eq!(depth.asks[0].quantity, dec(5));
    let s2_order = engine.query(&p("s2"), second.order_id).unwrap();
    assert_eq!(s2_order.status, OrderStatus::PartiallyFilled);
    assert_eq!(s2_order.remaining(), dec(5));
}

// Post-only that would cross is rejected with no book or balance change.
#[test]
fn post_only_rejected_when_crossing() {
    let (engine, _journal) = venue();
    fund_dec(&engine, "s", 10);
    fund_usd(&engine, "a", 10_000);

    engine
        .submit(OrderRequest::limit("s", "DEC/USD", Side::Sell, 10_000, dec(10)))
        .unwrap();

    let mut request = OrderRequest::limit("a", "DEC/USD", Side::Buy, 10_000, dec(5));
    request.kind = OrderKind::PostOnly;
    let result = engine.submit(request);
    assert_eq!(
        result.unwrap_err(),
        EngineError::Rejected(RejectReason::PostOnlyWouldCross)
    );

    let depth = engine.depth(&sym(), 5).unwrap();
    assert_eq!(depth.asks[0].quantity, dec(10));
    assert!(depth.bids.is_empty());
    let a_usd = engine.balance(&p("a"), &usd_asset());
    assert_eq!(a_usd.available, usd(10_000));
    assert_eq!(a_usd.locked, 0);

    // away from the spread it rests
    let mut passive = OrderRequest::limit("a", "DEC/USD", Side::Buy, 9_999, dec(5));
    passive.kind = OrderKind::PostOnly;
    let accepted = engine.submit(passive).unwrap();
    assert_eq!(accepted.status, OrderStatus::New);
}

// Self-match prevention under the default cancel-incoming policy.
#[test]
fn self_match_rejects_incoming() {
    let (engine, journal) = venue();
    fund_dec(&engine, "a", 10);
    fund_usd(&engine, "a", 10_000);

    let sell = engine
        .submit(OrderRequest::limit("a", "DEC/USD", Side::Sell, 10_000, dec(10)))
        .unwrap();

    let result = engine.submit(OrderRequest::limit("a", "DEC/USD", Side::Buy, 10_000, dec(5)));
    assert_eq!(
        result.unwrap_err(),
        EngineError::Rejected(RejectReason::SelfMatchRejected)
    );

    // the resting sell is untouched and the buy never locked anything
    let resting = engine.query(&p("a"), sell.order_id).unwrap();
    assert_eq!(resting.status, OrderStatus::New);
    assert_eq!(resting.remaining(), dec(10));
    assert_eq!(engine.balance(&p("a"), &usd_asset()).locked, 0);
    assert_eq!(engine.balance(&p("a"), &dec_asset()).locked, dec(10));
    assert_eq!(
        journal.events().last().map(|e| e.kind.tag()),
        Some("REJECTED")
    );
}

// Stop-loss: held off the book, fires when the last trade reaches the
// stop, and the TRIGGERED event precedes the resulting trades.
#[test]
fn stop_loss_fires_on_price_drop() {
    let (engine, journal) = venue();
    seed_last_trade(&engine, 10_000); // last trade 100.00

    fund_dec(&engine, "a", 10);
    fund_dec(&engine, "c", 10);
    fund_usd(&engine, "d", 10_000);
    fund_usd(&engine, "e", 10_000);

    let mut stop = OrderRequest::limit("a", "DEC/USD", Side::Sell, 0, dec(10));
    stop.kind = OrderKind::Stop;
    stop.limit_price = None;
    stop.stop_price = Some(9_500);
    let stop_accepted = engine.submit(stop).unwrap();
    assert_eq!(stop_accepted.status, OrderStatus::PendingTrigger);
    assert_eq!(engine.balance(&p("a"), &dec_asset()).locked, dec(10));
    // not on the book
    assert!(engine.depth(&sym(), 5).unwrap().asks.is_empty());

    // liquidity for the stop to consume once it fires
    engine
        .submit(OrderRequest::limit("e", "DEC/USD", Side::Buy, 9_400, dec(10)))
        .unwrap();

    // independent trade drags the last price to 94.99
    engine
        .submit(OrderRequest::limit("c", "DEC/USD", Side::Sell, 9_499, dec(1)))
        .unwrap();
    let push = engine
        .submit(OrderRequest::limit("d", "DEC/USD", Side::Buy, 9_499, dec(1)))
        .unwrap();
    // the push trade fired the stop, whose market sell hit e's bid
    assert_eq!(push.trades.len(), 2);
    assert_eq!(push.trades[1].taker_order, stop_accepted.order_id);
    assert_eq!(push.trades[1].price, 9_400);
    assert_eq!(push.trades[1].quantity, dec(10));

    let a_dec = engine.balance(&p("a"), &dec_asset());
    assert_eq!(a_dec.locked, 0);
    assert_eq!(a_dec.available, 0);
    assert_eq!(engine.balance(&p("a"), &usd_asset()).available, usd(940));

    // TRIGGERED precedes the stop's trade events
    let events = journal.events();
    let triggered_at = events
        .iter()
        .position(|e| e.kind.tag() == "TRIGGERED" && e.order == stop_accepted.order_id)
        .expect("triggered event");
    let stop_trade_at = events
        .iter()
        .position(|e| match &e.kind {
            EventKind::Trade { trade } => trade.taker_order == stop_accepted.order_id,
            _ => false,
        })
        .expect("stop trade event");
    assert!(triggered_at < stop_trade_at);
}

// Iceberg: one displayed slice at a time, replenished until the hidden
// pool drains, all under a single reservation.
#[test]
fn iceberg_slices_replenish() {
    let (engine, _journal) = venue();
    fund_dec(&engine, "s", 100);
    fund_usd(&engine, "b", 20_000);

    let mut iceberg = OrderRequest::limit("s", "DEC/USD", Side::Sell, 10_000, dec(100));
    iceberg.kind = OrderKind::Iceberg;
    iceberg.display_quantity = Some(dec(10));
    let parent = engine.submit(iceberg).unwrap();
    assert_eq!(engine.balance(&p("s"), &dec_asset()).locked, dec(100));

    // visible depth is one slice
    let depth = engine.depth(&sym(), 5).unwrap();
    assert_eq!(depth.asks.len(), 1);
    assert_eq!(depth.asks[0].quantity, dec(10));

    // ten takes of 10 DEC each drain it slice by slice
    for round in 1..=10u128 {
        let take = engine
            .submit(OrderRequest::limit("b", "DEC/USD", Side::Buy, 10_000, dec(10)))
            .unwrap();
        assert_eq!(take.trades.len(), 1, "round {round}");
        assert_eq!(take.trades[0].quantity, dec(10));

        let depth = engine.depth(&sym(), 5).unwrap();
        if round < 10 {
            assert_eq!(depth.asks.len(), 1, "round {round}");
            assert_eq!(depth.asks[0].quantity, dec(10), "round {round}");
        } else {
            assert!(depth.asks.is_empty());
        }
    }

    let parent_order = engine.query(&p("s"), parent.order_id).unwrap();
    assert_eq!(parent_order.status, OrderStatus::Filled);
    assert_eq!(parent_order.filled, dec(100));
    let seller = engine.balance(&p("s"), &dec_asset());
    assert_eq!(seller.locked, 0);
    assert_eq!(seller.available, 0);
    assert_eq!(engine.balance(&p("s"), &usd_asset()).available, usd(10_000));
}

// Fill-or-kill that cannot be fully filled leaves no trace.
#[test]
fn fok_unfillable_rejected() {
    let (engine, _journal) = venue();
    fund_dec(&engine, "x", 5);
    fund_dec(&engine, "y", 5);
    fund_usd(&engine, "b", 10_000);

    engine
        .submit(OrderRequest::limit("x", "DEC/USD", Side::Sell, 10_000, dec(5)))
        .unwrap();
    engine
        .submit(OrderRequest::limit("y", "DEC/USD", Side::Sell, 10_010, dec(5)))
        .unwrap();

    let result = engine.submit(
        OrderRequest::limit("b", "DEC/USD", Side::Buy, 10_020, dec(15))
            .with_tif(TimeInForce::Fok),
    );
    assert_eq!(
        result.unwrap_err(),
        EngineError::Rejected(RejectReason::FokUnfillable)
    );

    let b_usd = engine.balance(&p("b"), &usd_asset());
    assert_eq!(b_usd.available, usd(10_000));
    assert_eq!(b_usd.locked, 0);
    let depth = engine.depth(&sym(), 5).unwrap();
    assert_eq!(depth.asks.len(), 2);

    // and a feasible FOK executes in full
    let filled = engine
        .submit(
            OrderRequest::limit("b", "DEC/USD", Side::Buy, 10_010, dec(10))
                .with_tif(TimeInForce::Fok),
        )
        .unwrap();
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.trades.len(), 2);
}

// Per-symbol journal sequences are strictly increasing and trades carry
// both sides.
#[test]
fn journal_sequences_are_monotonic() {
    let (engine, journal) = venue();
    fund_usd(&engine, "a", 10_000);
    fund_dec(&engine, "b", 100);
    engine
        .submit(OrderRequest::limit("a", "DEC/USD", Side::Buy, 10_000, dec(5)))
        .unwrap();
    engine
        .submit(OrderRequest::limit("b", "DEC/USD", Side::Sell, 10_000, dec(7)))
        .unwrap();

    let events = journal.events();
    let mut previous = 0;
    for event in &events {
        assert!(event.sequence > previous, "sequence must strictly increase");
        previous = event.sequence;
    }
    let trade = events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::Trade { trade } => Some(trade.clone()),
            _ => None,
        })
        .expect("trade journaled");
    assert_eq!(trade.maker, p("a"));
    assert_eq!(trade.taker, p("b"));
    assert_eq!(trade.notional, usd(500));
}
