//! Drive the coordinator with a manual clock and in-process subscribers.
use std::sync::mpsc::{self, Receiver};

use clicksync::common::{
    bus_message::{BusMessage, ClientKey, ClientParamsStore, CompensationProfile},
    clock::ManualClock,
    event_bus::{ChannelBus, Inbound},
};
use clicksync::server::{
    calibration_store::CalibrationStore, click_server::ClickServer, metronome::Metronome,
    params::ServerParams,
};
use serde_json::{json, Value};

const TICK: u64 = 25_000;

fn server(params: &ServerParams) -> (ClickServer<ManualClock, ChannelBus>, ManualClock) {
    let clock = ManualClock::new(0);
    let server = ClickServer::new(
        clock.clone(),
        ChannelBus::new(),
        Metronome::new(params, TICK as u128),
        CalibrationStore::in_memory(),
    );
    (server, clock)
}

fn join(server: &mut ClickServer<ManualClock, ChannelBus>, conn: u64) -> Receiver<BusMessage> {
    let (tx, rx) = mpsc::channel();
    server.handle_inbound(Inbound::Connected(conn, tx));
    rx
}

fn drain(rx: &Receiver<BusMessage>) -> Vec<BusMessage> {
    rx.try_iter().collect()
}

fn click_times(msgs: &[BusMessage]) -> Vec<f64> {
    msgs.iter()
        .filter_map(|m| match m {
            BusMessage::Click(c) => Some(c.target_time),
            _ => None,
        })
        .collect()
}

fn states(msgs: &[BusMessage]) -> Vec<Value> {
    msgs.iter()
        .filter_map(|m| match m {
            BusMessage::ServerParams(v) => Some(v.clone()),
            _ => None,
        })
        .collect()
}

fn run_until(server: &mut ClickServer<ManualClock, ChannelBus>, clock: &ManualClock, end: u64) -> () {
    let mut now = 0;
    while now < end {
        now += TICK;
        clock.set(now);
        server.poll();
    }
}

fn params(active: bool, number: i64) -> ServerParams {
    ServerParams {
        active,
        delay: 150.0,
        period: 1000.0,
        number,
        ..ServerParams::default()
    }
}

mod state_broadcasts {
    use super::*;

    #[test]
    fn every_connection_refreshes_all_views() {
        let (mut server, _clock) = server(&params(false, -1));
        let first = join(&mut server, 1);
        assert_eq!(states(&drain(&first)).len(), 1);
        let second = join(&mut server, 2);
        assert_eq!(states(&drain(&first)).len(), 1);
        assert_eq!(states(&drain(&second)).len(), 1);
    }

    #[test]
    fn deactivating_twice_changes_nothing() {
        let (mut server, _clock) = server(&params(false, -1));
        let rx = join(&mut server, 1);
        drain(&rx);
        let before = server.get_metronome().get_state().clone();

        server.handle_message(1, BusMessage::ServerParams(json!({"active": false})), 0);
        let msgs = drain(&rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(states(&msgs)[0]["active"], false);
        assert_eq!(server.get_metronome().get_state(), &before);
    }

    #[test]
    fn activation_is_immediate_and_broadcast() {
        let (mut server, clock) = server(&params(false, -1));
        let rx = join(&mut server, 1);
        drain(&rx);
        clock.set(1_000_000);
        server.handle_message(1, BusMessage::ServerParams(json!({"active": "true"})), 1_000_000);
        let state = states(&drain(&rx));
        assert_eq!(state.last().unwrap()["active"], true);
        assert_eq!(server.get_metronome().get_next_trigger(), 1_150_000);
    }

    #[test]
    fn bad_payload_still_answers_with_state() {
        let (mut server, _clock) = server(&params(false, -1));
        let rx = join(&mut server, 1);
        drain(&rx);
        server.handle_message(1, BusMessage::ServerParams(json!("fast")), 0);
        let state = states(&drain(&rx));
        assert_eq!(state.len(), 1);
        assert_eq!(state[0]["period"], 1000.0);
    }
}

mod scheduling {
    use super::*;

    #[test]
    fn finite_count_runs_out() {
        let (mut server, clock) = server(&params(true, 2));
        let rx = join(&mut server, 1);
        server.start(true);
        drain(&rx);

        run_until(&mut server, &clock, 5_000_000);
        let msgs = drain(&rx);
        assert_eq!(click_times(&msgs), vec![0.15, 1.15]);
        let last = states(&msgs).pop().unwrap();
        assert_eq!(last["active"], false);
        assert_eq!(last["number"], 0);
        assert!(!server.get_metronome().is_active());
        assert_eq!(server.get_metronome().get_remaining(), 0);
    }

    #[test]
    fn stall_realigns_on_the_phase() {
        let (mut server, clock) = server(&params(true, -1));
        let rx = join(&mut server, 1);
        server.start(true);
        clock.set(TICK);
        server.poll();
        assert_eq!(click_times(&drain(&rx)), vec![0.15]);

        // 3.4 s late: next trigger is 5.15, outside the window
        clock.set(4_550_000);
        server.poll();
        assert!(click_times(&drain(&rx)).is_empty());
        assert_eq!(server.get_metronome().get_next_trigger(), 5_150_000);

        clock.set(5_100_000);
        server.poll();
        assert_eq!(click_times(&drain(&rx)), vec![5.15]);
        assert_eq!(server.get_metronome().get_next_trigger(), 6_150_000);
    }

    #[test]
    fn clicks_reach_every_subscriber_until_they_leave() {
        let (mut server, clock) = server(&params(true, -1));
        let a = join(&mut server, 1);
        let b = join(&mut server, 2);
        server.start(true);
        clock.set(TICK);
        server.poll();
        assert_eq!(click_times(&drain(&a)), vec![0.15]);
        assert_eq!(click_times(&drain(&b)), vec![0.15]);

        server.handle_inbound(Inbound::Disconnected(2));
        assert_eq!(server.get_bus().subscriber_count(), 1);
        run_until(&mut server, &clock, 1_100_000);
        assert_eq!(click_times(&drain(&a)), vec![1.15]);
    }

    #[test]
    fn click_carries_gain_and_duration_in_seconds() {
        let p = ServerParams {
            gain: -6.0,
            duration: 50.0,
            ..params(true, -1)
        };
        let (mut server, clock) = server(&p);
        let rx = join(&mut server, 1);
        server.start(true);
        clock.set(TICK);
        server.poll();
        let click = drain(&rx)
            .into_iter()
            .find_map(|m| match m {
                BusMessage::Click(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(click.gain, -6.0);
        assert!((click.duration - 0.05).abs() < 1e-12);
    }
}

mod calibration {
    use super::*;

    fn key(output: &str) -> ClientKey {
        ClientKey {
            user_agent: "Mozilla/5.0 (X11)".to_string(),
            output: output.to_string(),
        }
    }

    #[test]
    fn stored_profile_goes_back_to_the_requester_only() {
        let (mut server, _clock) = server(&params(false, -1));
        let a = join(&mut server, 1);
        let b = join(&mut server, 2);
        let profile = CompensationProfile {
            delay: 0.012,
            gain: -3.0,
        };
        server.handle_message(
            1,
            BusMessage::ClientParamsStore(ClientParamsStore {
                user_agent: key("internal").user_agent,
                output: "internal".to_string(),
                data: profile,
            }),
            0,
        );
        drain(&a);
        drain(&b);

        server.handle_message(2, BusMessage::ClientParamsRequest(key("internal")), 0);
        assert!(drain(&a).is_empty());
        assert_eq!(drain(&b), vec![BusMessage::ClientParams(profile)]);

        // nothing stored for this output
        server.handle_message(2, BusMessage::ClientParamsRequest(key("external")), 0);
        assert!(drain(&b).is_empty());
    }
}
