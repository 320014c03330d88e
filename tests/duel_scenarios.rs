//! End-to-end scenarios driving the simulation through its public API

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use kite_game::game::duel::{DuelTracker, DUEL_DURATION};
use kite_game::game::kite::{Anchor, Kite, KitePhysics, KiteTuning};
use kite_game::game::line::LineGeometry;
use kite_game::game::pickup::MAX_ACTIVE_PICKUPS;
use kite_game::game::r#match::{GameMatch, MatchRules, PlayerState};
use kite_game::game::TickInput;
use kite_game::relay::protocol::{GameEvent, MatchCmd, MatchPhase, WindState};
use kite_game::util::time::tick_delta;

fn uuid(byte: u8) -> Uuid {
    Uuid::from_bytes([byte; 16])
}

fn calm() -> WindState {
    WindState {
        speed: 0.0,
        direction: 1.0,
        change_timer: 60.0,
    }
}

/// Two stationary kites ten units apart, lines within the crossing
/// threshold, one side pulling continuously: within the full duel
/// duration exactly one cut resolves and exactly one kite dies.
#[test]
fn stationary_duel_resolves_one_cut() {
    let tuning = KiteTuning::default();

    let mut players: BTreeMap<Uuid, PlayerState> = BTreeMap::new();
    for (byte, anchor_x) in [(1u8, 700.0f32), (2u8, 710.0f32)] {
        let anchor = Anchor { x: anchor_x, y: 0.0 };
        let mut player = PlayerState::new(
            uuid(byte),
            format!("Player_{byte}"),
            byte as usize,
            anchor,
            &tuning,
        );
        player.ready = true;
        player.kite.x = anchor_x;
        player.kite.y = 400.0;
        players.insert(uuid(byte), player);
    }

    // Sanity: parallel lines ten units apart sit under the threshold
    let a = players[&uuid(1)].clone();
    let b = players[&uuid(2)].clone();
    let contact = LineGeometry::check(&a.kite, a.anchor, &b.kite, b.anchor);
    assert!(contact.crossing);

    // One side pulls continuously; kites themselves stay stationary
    let mut inputs: HashMap<Uuid, TickInput> = HashMap::new();
    inputs.insert(
        uuid(1),
        TickInput {
            seq: 1,
            pull: true,
            steer: 0.0,
        },
    );

    let mut tracker = DuelTracker::new();
    let mut events = Vec::new();
    let dt = tick_delta();
    let ticks = (DUEL_DURATION / dt).ceil() as u32;
    for _ in 0..ticks {
        tracker.update(&mut players, &inputs, dt, &mut events);
    }

    let cut_events: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GameEvent::CutResolved { winner, loser } => Some((*winner, *loser)),
            _ => None,
        })
        .collect();
    assert_eq!(cut_events.len(), 1, "exactly one cut must resolve");

    let (winner, loser) = cut_events[0];
    assert_eq!(winner, uuid(1), "the pulling side wins the tug-of-war");
    assert_eq!(loser, uuid(2));

    let dead: Vec<_> = players.values().filter(|p| !p.kite.alive).collect();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].user_id, loser);
    assert!(tracker.is_empty());
}

/// Two seconds of continuous pulling at the 60 Hz baseline, no wind and
/// no steering, out-climbs the same duration spent coasting.
#[test]
fn continuous_pull_gains_height() {
    let tuning = KiteTuning::default();
    let anchor = Anchor { x: 800.0, y: 0.0 };
    let wind = calm();
    let dt = tick_delta();

    let pull = TickInput {
        seq: 0,
        pull: true,
        steer: 0.0,
    };
    let coast = TickInput::neutral();

    let start = Kite::spawned(anchor, &tuning);
    let mut pulling = start;
    let mut coasting = start;

    for tick in 0..120 {
        let t = tick as f32 * dt;
        let (p, _) = KitePhysics::step(&pulling, anchor, &pull, &wind, &[], t, dt, &tuning);
        let (c, _) = KitePhysics::step(&coasting, anchor, &coast, &wind, &[], t, dt, &tuning);
        pulling = p;
        coasting = c;

        assert!(
            pulling.y > coasting.y,
            "pulling must out-climb coasting on tick {tick}"
        );
    }

    assert!(pulling.y > start.y);
    assert!(coasting.y < start.y);
}

/// A bot-only match holds every core invariant across a whole round.
#[test]
fn bot_match_soak_holds_invariants() {
    let rules = MatchRules {
        min_players: 2,
        max_players: 6,
        duration_secs: 20.0,
    };
    let (mut game, _handle) = GameMatch::new(Uuid::from_bytes([3; 16]), 1234, rules);

    for _ in 0..4 {
        game.handle_cmd(MatchCmd::AddBot);
    }
    assert_eq!(game.state().phase, MatchPhase::Countdown);

    let dt = tick_delta();
    let tuning = KiteTuning::default();
    let total_ticks = ((5.0 + rules.duration_secs + 1.0) / dt).ceil() as u32;

    for _ in 0..total_ticks {
        game.run_tick();

        let state = game.state();
        for player in state.players.values() {
            let dx = player.kite.x - player.anchor.x;
            let dy = player.kite.y - player.anchor.y;
            let dist = (dx * dx + dy * dy).sqrt();
            assert!(dist <= tuning.max_line_length + 1e-3);
            assert!(player.kite.x >= 0.0 && player.kite.x <= tuning.world_width);
            assert!(player.kite.y >= 0.0 && player.kite.y <= tuning.world_height);
        }
        for (_, duel) in state.duels.iter() {
            assert!((0.0..=1.0).contains(&duel.progress));
        }
        assert!(state.pickups.active_count() <= MAX_ACTIVE_PICKUPS);
    }

    assert_eq!(game.state().phase, MatchPhase::Finished);
    let rankings = game.rankings();
    assert_eq!(rankings.len(), 4);
    for pair in rankings.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

/// Two matches created from the same seed and fed the same commands
/// replay tick-for-tick identically.
#[test]
fn seeded_matches_replay_identically() {
    let rules = MatchRules {
        min_players: 2,
        max_players: 6,
        duration_secs: 60.0,
    };
    let (mut left, _lh) = GameMatch::new(Uuid::from_bytes([4; 16]), 777, rules);
    let (mut right, _rh) = GameMatch::new(Uuid::from_bytes([5; 16]), 777, rules);

    for _ in 0..3 {
        left.handle_cmd(MatchCmd::AddBot);
        right.handle_cmd(MatchCmd::AddBot);
    }

    for _ in 0..1800 {
        left.run_tick();
        right.run_tick();
    }

    let left_state = left.state();
    let right_state = right.state();
    assert_eq!(left_state.phase, right_state.phase);
    assert_eq!(left_state.players.len(), right_state.players.len());

    for (l, r) in left_state
        .players
        .values()
        .zip(right_state.players.values())
    {
        assert_eq!(l.user_id, r.user_id);
        assert_eq!(l.kite, r.kite);
        assert_eq!(l.score, r.score);
        assert_eq!(l.cuts, r.cuts);
    }

    assert_eq!(left_state.wind.speed, right_state.wind.speed);
    assert_eq!(left_state.wind.direction, right_state.wind.direction);
    assert_eq!(
        left_state.pickups.active_count(),
        right_state.pickups.active_count()
    );
    assert_eq!(left_state.duels.len(), right_state.duels.len());
}
