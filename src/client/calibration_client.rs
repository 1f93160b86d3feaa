//! Client side state: clock sync, calibration profiles and pending clicks.
//!
//! Nothing in here touches a socket.  The run loop in
//! [`crate::client::click_client`] feeds it messages and local clock readings
//! and sends whatever it returns.
use std::collections::BTreeMap;
use std::fmt;

use log::{debug, error, info};

use crate::{
    client::{
        audio_output::AudioOutput,
        click_renderer::{schedule_click, ClickQueue, ScheduledClick},
        click_track::{ClickTrack, SAMPLE_RATE},
    },
    common::{
        bus_message::{BusMessage, ClickEvent, ClientKey, ClientParamsStore, CompensationProfile},
        clock_sync::ClockSync,
    },
};

pub const OUTPUTS: [&str; 2] = ["internal", "external"];

/// played when audio gets switched on, so there is something to hear right away
const ACTIVATION_CLICK: ClickEvent = ClickEvent {
    target_time: 0.0,
    gain: -10.0,
    duration: 0.1,
};

pub struct CalibrationClient<O: AudioOutput> {
    user_agent: String,
    output_name: String,
    profiles: BTreeMap<String, CompensationProfile>,
    audio_active: bool,
    output_failed: bool,
    sync: ClockSync,
    queue: ClickQueue,
    track: ClickTrack,
    output: O,
    played: usize,
}

impl<O: AudioOutput> CalibrationClient<O> {
    pub fn new(user_agent: &str, output_name: &str, sync: ClockSync, output: O) -> CalibrationClient<O> {
        let mut profiles = BTreeMap::new();
        for name in OUTPUTS {
            profiles.insert(name.to_string(), CompensationProfile::default());
        }
        profiles.insert(output_name.to_string(), CompensationProfile::default());
        CalibrationClient {
            user_agent: user_agent.to_string(),
            output_name: output_name.to_string(),
            profiles,
            audio_active: false,
            output_failed: false,
            sync,
            queue: ClickQueue::new(),
            track: ClickTrack::new(SAMPLE_RATE),
            output,
            played: 0,
        }
    }

    pub fn get_sync(&self) -> &ClockSync {
        &self.sync
    }
    pub fn get_output(&self) -> &O {
        &self.output
    }
    pub fn get_output_name(&self) -> &str {
        &self.output_name
    }
    pub fn is_audio_active(&self) -> bool {
        self.audio_active
    }
    /// false once the output failed, sync keeps going regardless
    pub fn is_playback_enabled(&self) -> bool {
        self.audio_active && !self.output_failed
    }
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
    pub fn played(&self) -> usize {
        self.played
    }

    /// profile of the selected output
    pub fn profile(&self) -> CompensationProfile {
        self.profiles
            .get(&self.output_name)
            .copied()
            .unwrap_or_default()
    }
    pub fn set_profile(&mut self, output: &str, profile: CompensationProfile) -> () {
        self.profiles.insert(output.to_string(), profile);
    }

    /// Switching audio on plays a test click immediately
    pub fn set_audio_active(&mut self, active: bool, now_local: f64) -> () {
        let was_active = self.audio_active;
        self.audio_active = active;
        if !active {
            self.queue.clear();
        } else if !was_active {
            self.queue.push(ScheduledClick {
                at_local: now_local,
                gain_db: ACTIVATION_CLICK.gain - self.profile().gain,
                duration: ACTIVATION_CLICK.duration,
            });
        }
    }

    pub fn sync_request(&self, now_local: f64) -> BusMessage {
        BusMessage::SyncRequest(now_local)
    }
    pub fn params_request(&self) -> BusMessage {
        BusMessage::ClientParamsRequest(ClientKey {
            user_agent: self.user_agent.clone(),
            output: self.output_name.clone(),
        })
    }
    pub fn params_store(&self) -> BusMessage {
        BusMessage::ClientParamsStore(ClientParamsStore {
            user_agent: self.user_agent.clone(),
            output: self.output_name.clone(),
            data: self.profile(),
        })
    }

    pub fn handle_message(&mut self, msg: BusMessage, now_local: f64) -> () {
        match msg {
            BusMessage::SyncReply(reply) => {
                let sample = self.sync.handle_reply(reply, now_local);
                debug!(
                    "sync sample {}: round trip {:.6}, offset {:.6}",
                    self.sync.sample_count(),
                    sample.round_trip,
                    sample.offset
                );
            }
            BusMessage::Click(click) => self.handle_click(&click, now_local),
            BusMessage::ClientParams(profile) => {
                info!("calibration for {} from server: {:?}", self.output_name, profile);
                let name = self.output_name.clone();
                self.set_profile(&name, profile);
            }
            BusMessage::ServerParams(params) => debug!("server-params: {}", params),
            other => debug!("ignoring {}", other.event()),
        }
    }

    fn handle_click(&mut self, click: &ClickEvent, now_local: f64) -> () {
        if !self.is_playback_enabled() {
            return;
        }
        match self.sync.get_estimate() {
            Some(estimate) => {
                let scheduled = schedule_click(click, &estimate, &self.profile(), now_local);
                debug!("click {} scheduled {}", click.target_time, scheduled);
                self.queue.push(scheduled);
            }
            None => debug!("click at {} dropped, clock not synchronised yet", click.target_time),
        }
    }

    /// Hand every due click to the output.  Returns how many were played.
    ///
    /// An output error switches playback off for good.
    pub fn fire_due(&mut self, now_local: f64) -> usize {
        let mut count = 0;
        for click in self.queue.take_due(now_local) {
            if self.output_failed {
                break;
            }
            let samples = self.track.buffer_for(click.duration);
            match self.output.play(samples, click.at_local, click.linear_gain() as f32) {
                Ok(()) => count += 1,
                Err(e) => {
                    error!("audio output failed, playback disabled: {}", e);
                    self.output_failed = true;
                    self.queue.clear();
                }
            }
        }
        self.played += count;
        count
    }

    /// flush the output
    pub fn finish(&mut self) -> () {
        if let Err(e) = self.output.finish() {
            error!("audio output did not close cleanly: {}", e);
        }
    }
}

impl<O: AudioOutput> fmt::Display for CalibrationClient<O> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ output: {}, profile: {:?}, audio: {}, played: {}, sync: {} }}",
            self.output_name,
            self.profile(),
            self.is_playback_enabled(),
            self.played,
            self.sync
        )
    }
}

#[cfg(test)]
mod test_calibration_client {
    use super::*;
    use crate::client::audio_output::MockAudioOutput;
    use crate::common::clock_sync::{sync_reply, SAMPLE_CAPACITY};
    use mockall::predicate::*;

    fn synced(client: &mut CalibrationClient<MockAudioOutput>, offset: f64) -> () {
        // symmetric exchanges, 10 ms round trip
        for i in 0..SAMPLE_CAPACITY {
            let t1 = i as f64;
            let t2 = t1 + 0.005 + offset;
            let reply = sync_reply(t1, t2, t2);
            client.handle_message(BusMessage::SyncReply(reply), t1 + 0.010);
        }
    }

    fn click(target_time: f64) -> BusMessage {
        BusMessage::Click(ClickEvent {
            target_time,
            gain: -10.0,
            duration: 0.00005,
        })
    }

    #[test]
    fn clicks_before_sync_are_dropped() {
        let mut client = CalibrationClient::new("ua", "internal", ClockSync::new(), MockAudioOutput::new());
        client.audio_active = true;
        client.handle_message(click(5.0), 1.0);
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn inactive_audio_ignores_clicks() {
        let mut client = CalibrationClient::new("ua", "internal", ClockSync::new(), MockAudioOutput::new());
        synced(&mut client, 0.0);
        client.handle_message(click(50.0), 30.0);
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn click_plays_at_compensated_instant() {
        let mut output = MockAudioOutput::new();
        output
            .expect_play()
            .withf(|samples, at, gain| {
                samples.len() == 2 && (*at - 49.992).abs() < 1e-9 && (*gain - 0.446_683_6).abs() < 1e-5
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut client = CalibrationClient::new("ua", "internal", ClockSync::new(), output);
        synced(&mut client, -0.002);
        assert!((client.get_sync().get_offset().unwrap() + 0.002).abs() < 1e-9);
        client.set_profile(
            "internal",
            CompensationProfile {
                delay: 0.010,
                gain: -3.0,
            },
        );
        client.audio_active = true;
        client.handle_message(click(50.0), 30.0);
        assert_eq!(client.pending(), 1);
        assert_eq!(client.fire_due(49.9), 0);
        assert_eq!(client.fire_due(49.993), 1);
        assert_eq!(client.played(), 1);
    }

    #[test]
    fn output_error_disables_playback() {
        let mut output = MockAudioOutput::new();
        output
            .expect_play()
            .times(1)
            .returning(|_, _, _| Err("device gone".into()));
        let mut client = CalibrationClient::new("ua", "internal", ClockSync::new(), output);
        synced(&mut client, 0.0);
        client.audio_active = true;
        client.handle_message(click(40.0), 30.0);
        client.handle_message(click(41.0), 30.0);
        assert_eq!(client.fire_due(45.0), 0);
        assert!(!client.is_playback_enabled());
        assert_eq!(client.pending(), 0);
        client.handle_message(click(50.0), 46.0);
        assert_eq!(client.pending(), 0);
        // sync goes on
        client.handle_message(BusMessage::SyncReply(sync_reply(46.0, 46.005, 46.005)), 46.01);
        assert!(client.get_sync().is_synchronized());
    }

    #[test]
    fn activation_plays_a_test_click() {
        let mut output = MockAudioOutput::new();
        output
            .expect_play()
            .with(always(), eq(2.0), always())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut client = CalibrationClient::new("ua", "internal", ClockSync::new(), output);
        client.set_audio_active(true, 2.0);
        client.set_audio_active(true, 2.0);
        assert_eq!(client.fire_due(2.0), 1);
    }

    #[test]
    fn client_params_update_selected_output() {
        let mut client = CalibrationClient::new("ua", "external", ClockSync::new(), MockAudioOutput::new());
        let profile = CompensationProfile {
            delay: 0.02,
            gain: 1.5,
        };
        client.handle_message(BusMessage::ClientParams(profile), 0.0);
        assert_eq!(client.profile(), profile);
        match client.params_store() {
            BusMessage::ClientParamsStore(store) => {
                assert_eq!(store.output, "external");
                assert_eq!(store.data, profile);
            }
            other => panic!("unexpected {}", other),
        }
        assert_eq!(
            client.params_request(),
            BusMessage::ClientParamsRequest(ClientKey {
                user_agent: "ua".to_string(),
                output: "external".to_string()
            })
        );
    }
}
