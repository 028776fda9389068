use std::time::Duration;

use cardgrid_foundation::lazy::{LoadPhase, ScrollOutcome};
use cardgrid_foundation::{Asset, GridConfig, GridNotice, ItemId, MAX_BATCH, MIN_BATCH};
use cardgrid_testing::{deck, GridHarness, ScriptedAssetCache, Suit, TestCard};
use proptest::prelude::*;

const PAST_COOLDOWN: Duration = Duration::from_millis(200);

fn started(outcome: Option<ScrollOutcome>) -> usize {
    match outcome {
        Some(ScrollOutcome::LoadStarted { count }) => count,
        other => panic!("expected a load to start, got {other:?}"),
    }
}

#[test]
fn queue_of_47_drains_in_three_triggers() {
    let mut harness = GridHarness::start(GridConfig::default(), deck(77));
    assert_eq!(harness.stats().sink_len, 30);
    assert_eq!(harness.stats().queue_len, 47);

    let mut chunks = Vec::new();
    for position in [0.85, 0.86, 0.87] {
        harness.advance(PAST_COOLDOWN);
        chunks.push(started(harness.notify_scroll(position)));
        harness.pump_until_idle();
        assert!(!harness.stats().in_flight);
        assert_eq!(harness.grid().phase(), LoadPhase::Idle);
    }

    assert_eq!(chunks, vec![20, 18, 9]);
    assert!(chunks.iter().all(|&chunk| chunk <= 20));
    let stats = harness.stats();
    assert_eq!(stats.queue_len, 0);
    assert_eq!(stats.sink_len, 77);
    assert_eq!(stats.loader.items_appended, 47);
    assert_eq!(
        harness.grid().sink().map(|sink| sink.ids()),
        Some((0..77).map(ItemId).collect())
    );
    assert_eq!(
        harness.notices().notices(),
        vec![GridNotice::AllItemsLoaded { total: 77 }]
    );

    harness.advance(PAST_COOLDOWN);
    assert_eq!(harness.notify_scroll(0.99), Some(ScrollOutcome::NoLoad));
}

#[test]
fn notifications_while_in_flight_run_one_load() {
    let cache = ScriptedAssetCache::new().with_pending_polls(3);
    let mut harness = GridHarness::with_cache(GridConfig::default(), deck(77), cache);
    harness.init().unwrap();

    harness.advance(PAST_COOLDOWN);
    assert_eq!(started(harness.notify_scroll(0.9)), 20);
    assert!(harness.stats().in_flight);

    for position in [0.92, 0.97] {
        harness.advance(PAST_COOLDOWN);
        assert_eq!(harness.notify_scroll(position), Some(ScrollOutcome::InFlight));
        let stats = harness.stats();
        assert_eq!(stats.queue_len, 47);
        assert!(stats.in_flight);
    }

    harness.pump_until_idle();
    let stats = harness.stats();
    assert_eq!(stats.loader.batches_started, 1);
    assert_eq!(stats.loader.batches_completed, 1);
    assert_eq!(stats.queue_len, 27);
    assert!(!stats.in_flight);
}

#[test]
fn sub_batches_land_whole() {
    let config = GridConfig::default().with_sub_batch_size(4);
    let cache = ScriptedAssetCache::new().with_pending_polls(1);
    let mut harness = GridHarness::with_cache(config, deck(77), cache);
    harness.init().unwrap();

    harness.advance(PAST_COOLDOWN);
    started(harness.notify_scroll(0.9));
    let mut seen = vec![harness.stats().sink_len];
    while harness.runtime().has_pending_tasks() {
        harness.tick();
        seen.push(harness.stats().sink_len);
    }
    assert!(seen.iter().all(|len| (len - 30) % 4 == 0));
    assert_eq!(seen.last(), Some(&50));
    // The sink grew by one sub-batch at most per frame.
    assert!(seen.windows(2).all(|w| w[1] - w[0] <= 4));
}

#[test]
fn failed_asset_gets_placeholder() {
    let cache = ScriptedAssetCache::new();
    cache.fail(TestCard::art_key(35));
    let mut harness = GridHarness::with_cache(GridConfig::default(), deck(77), cache);
    harness.init().unwrap();

    harness.advance(PAST_COOLDOWN);
    started(harness.notify_scroll(0.9));
    harness.pump_until_idle();

    let sink = harness.grid().sink().expect("grid is running");
    assert_eq!(sink.len(), 50);
    assert_eq!(
        sink.with_card(35, |card| card.asset.clone()),
        Some(Some(Asset::Placeholder))
    );
    assert!(matches!(
        sink.with_card(36, |card| card.asset.clone()),
        Some(Some(Asset::Loaded { .. }))
    ));
    assert_eq!(harness.stats().loader.asset_failures, 1);
    assert_eq!(
        harness.notices().notices(),
        vec![GridNotice::AssetsDegraded { failed: 1 }]
    );
}

#[test]
fn initial_load_uses_only_cached_assets() {
    let cache = ScriptedAssetCache::new();
    cache.preload(TestCard::art_key(0));
    let mut harness = GridHarness::with_cache(GridConfig::default(), deck(40), cache);
    harness.init().unwrap();

    let sink = harness.grid().sink().expect("grid is running");
    assert!(matches!(
        sink.with_card(0, |card| card.asset.clone()),
        Some(Some(Asset::Loaded { .. }))
    ));
    assert_eq!(sink.with_card(1, |card| card.asset.clone()), Some(None));
    assert!(harness.cache().loads().is_empty());
}

#[test]
fn cards_without_art_skip_prefetch() {
    let cards: Vec<TestCard> = (0..40).map(|id| TestCard::new(id).without_art()).collect();
    let mut harness = GridHarness::start(GridConfig::default(), cards);
    harness.advance(PAST_COOLDOWN);
    started(harness.notify_scroll(0.9));
    harness.pump_until_idle();
    assert_eq!(harness.stats().sink_len, 40);
    assert!(harness.cache().loads().is_empty());
}

#[test]
fn filter_change_resets_window_and_ignores_reset_notification() {
    let mut harness = GridHarness::start(GridConfig::default(), deck(77));
    harness.scroll_to(1800.0);
    harness.advance(PAST_COOLDOWN);
    started(harness.notify_scroll(0.9));
    harness.tick();

    let hearts: Vec<TestCard> = deck(77)
        .into_iter()
        .filter(|card| card.suit == Suit::Hearts)
        .collect();
    assert_eq!(hearts.len(), 39);
    harness.replace_items(hearts);
    harness.pump_until_idle();

    assert_eq!(harness.host().offset(), 0.0);
    assert_eq!(harness.host().resets(), 1);
    let expected: Vec<ItemId> = (0..10u64).map(|i| ItemId(i * 2)).collect();
    assert_eq!(harness.visible_items(), expected);

    let stats = harness.stats();
    assert_eq!(stats.sink_len, 30);
    assert_eq!(stats.queue_len, 9);
    assert!(!stats.in_flight);
    assert_eq!(stats.loader.batches_abandoned, 1);
    let sink = harness.grid().sink().expect("grid is running");
    assert!(sink.ids().iter().all(|id| id.0 % 2 == 0));

    // The host's programmatic reset emits a notification; it is not a trigger.
    assert_eq!(harness.notify_scroll(0.0), Some(ScrollOutcome::Ignored));
    assert_eq!(harness.stats().loader.batches_started, 1);

    harness.advance(PAST_COOLDOWN);
    assert_eq!(started(harness.notify_scroll(0.95)), 9);
    harness.pump_until_idle();
    assert_eq!(harness.stats().sink_len, 39);
    assert_eq!(
        harness.notices().notices(),
        vec![
            GridNotice::SourceReplaced { total: 39 },
            GridNotice::AllItemsLoaded { total: 39 },
        ]
    );
}

#[test]
fn content_height_grows_with_loaded_items() {
    let mut harness = GridHarness::start(GridConfig::default(), deck(77));
    // 15 rows loaded.
    assert_eq!(harness.host().reported_content_height(), 3420.0);
    harness.advance(PAST_COOLDOWN);
    started(harness.notify_scroll(0.9));
    harness.pump_until_idle();
    // 25 rows loaded.
    assert_eq!(harness.host().reported_content_height(), 8.0 + 25.0 * 220.0 + 24.0 * 8.0);
}

#[test]
fn window_picks_up_cards_appended_below() {
    let mut harness = GridHarness::start(GridConfig::default(), deck(77));
    // The bottom of the first 30 cards is also the trailing edge.
    assert!(matches!(
        harness.scroll_to(2820.0),
        Some(ScrollOutcome::LoadStarted { .. })
    ));
    assert!(harness.visible_items().iter().all(|id| id.0 < 30));

    harness.pump_until_idle();
    assert!(harness.visible_items().iter().any(|id| id.0 >= 30));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn dynamic_batch_size_stays_bounded(
        steps in prop::collection::vec((0.0f32..=1.0, 0u64..400, any::<bool>()), 1..40)
    ) {
        let mut harness = GridHarness::start(GridConfig::default(), deck(600));
        for (position, millis, pump) in steps {
            harness.advance(Duration::from_millis(millis));
            harness.notify_scroll(position);
            if pump {
                harness.pump_until_idle();
            }
            let size = harness.grid().dynamic_batch_size().unwrap_or(MIN_BATCH);
            prop_assert!((MIN_BATCH..=MAX_BATCH).contains(&size));
        }
    }
}
