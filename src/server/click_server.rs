//! entry point called by main to run the click server
//!
//! The server is made of
//! - a listener thread that accepts websocket connections, one thread per connection
//!   (see [`crate::server::connection`])
//! - the coordinator, [`ClickServer`], which owns the metronome, the calibration
//!   store and the event bus.  It runs on the thread that calls [`run`] and is
//!   the only writer of that state.
//!
//! Connection threads forward every inbound message to the coordinator over an
//! mpsc channel.  The coordinator loops handling those messages and polling the
//! metronome wake-up.
use std::{
    path::PathBuf,
    sync::mpsc,
    thread::sleep,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    common::{
        box_error::BoxError,
        bus_message::{BusMessage, ClientKey, ClientParamsStore},
        clock::{micros_to_secs, Clock, MonotonicClock},
        clock_sync::sync_reply,
        config::Config,
        event_bus::{ChannelBus, ConnId, EventBus, Inbound},
    },
    server::{
        calibration_store::CalibrationStore,
        connection,
        metronome::Metronome,
        params::ServerParams,
    },
};

/// Everything the server reads from its settings file
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub port: u16,
    pub calibration_file: PathBuf,
    /// microseconds
    pub tick_interval: u128,
    pub params: ServerParams,
}

impl ServerSettings {
    pub fn default_params() -> json::JsonValue {
        json::object! {
            "port": 3000,
            "calibration_file": "data/web-audio-calibration.json",
            "tick_interval_ms": 25,
            "active": true,
            "delay": 100.0,
            "gain": 0.0,
            "period": 1000.0,
            "number": -1,
            "duration": 0.05
        }
    }

    /// `PORT` in the environment wins over the settings file
    pub fn from_config(config: &Config) -> Result<ServerSettings, BoxError> {
        let mut port = config.get_u32_value("port", None)?;
        if let Ok(env_port) = std::env::var("PORT") {
            match env_port.parse::<u32>() {
                Ok(p) => port = p,
                Err(e) => warn!("ignoring PORT={}: {}", env_port, e),
            }
        }
        let tick_ms = config.get_u32_value("tick_interval_ms", None)?;
        Ok(ServerSettings {
            port: u16::try_from(port)?,
            calibration_file: PathBuf::from(config.get_str_value("calibration_file", None)?),
            tick_interval: (tick_ms.max(1) as u128) * 1000,
            params: ServerParams {
                active: config.get_bool_value("active", None)?,
                delay: config.get_f64_value("delay", None)?,
                gain: config.get_f64_value("gain", None)?,
                period: config.get_f64_value("period", None)?,
                number: config.get_i64_value("number", None)?,
                duration: config.get_f64_value("duration", None)?,
            }
            .bounded(),
        })
    }
}

/// The coordinator.  Single writer of the metronome and the store.
pub struct ClickServer<C: Clock, B: EventBus> {
    clock: C,
    bus: B,
    metronome: Metronome,
    store: CalibrationStore,
}

impl<C: Clock, B: EventBus> ClickServer<C, B> {
    pub fn new(clock: C, bus: B, metronome: Metronome, store: CalibrationStore) -> ClickServer<C, B> {
        ClickServer {
            clock,
            bus,
            metronome,
            store,
        }
    }

    pub fn get_metronome(&self) -> &Metronome {
        &self.metronome
    }
    pub fn get_store(&self) -> &CalibrationStore {
        &self.store
    }
    pub fn get_bus(&self) -> &B {
        &self.bus
    }

    /// run by default, if asked to
    pub fn start(&mut self, active: bool) -> () {
        if active {
            let now = self.clock.now_micros();
            self.metronome.activate(now);
        }
        self.broadcast_params();
    }

    pub fn handle_inbound(&mut self, inbound: Inbound) -> () {
        match inbound {
            Inbound::Connected(conn, tx) => {
                info!("connection {} joined", conn);
                self.bus.subscribe(conn, tx);
                // initialise the controls of whoever is listening
                self.broadcast_params();
            }
            Inbound::Message {
                conn,
                msg,
                received_at,
            } => self.handle_message(conn, msg, received_at),
            Inbound::Disconnected(conn) => {
                info!("connection {} left", conn);
                self.bus.unsubscribe(conn);
            }
        }
    }

    pub fn handle_message(&mut self, conn: ConnId, msg: BusMessage, received_at: u128) -> () {
        debug!("from {}: {}", conn, msg);
        match msg {
            BusMessage::SyncRequest(t1) => {
                let t2 = micros_to_secs(received_at);
                let reply = sync_reply(t1, t2, self.clock.now_secs());
                self.bus.send_to(conn, &BusMessage::SyncReply(reply));
            }
            BusMessage::ServerParams(raw) => self.update_params(&raw),
            BusMessage::ClientParamsStore(store) => self.store_client_params(store),
            BusMessage::ClientParamsRequest(key) => self.send_client_params(conn, &key),
            other => debug!("ignoring {} from {}", other.event(), conn),
        }
    }

    /// Wake the scheduler if it is due and broadcast what it produced
    pub fn poll(&mut self) -> () {
        let now = self.clock.now_micros();
        let result = self.metronome.poll(now);
        for click in &result.clicks {
            self.bus.publish(&BusMessage::Click(*click));
        }
        if result.state_changed {
            self.broadcast_params();
        }
    }

    fn update_params(&mut self, raw: &serde_json::Value) -> () {
        let now = self.clock.now_micros();
        match self.metronome.apply_params(raw, now) {
            Ok(changed) => debug!("server-params applied, changed: {}", changed),
            Err(e) => warn!("bad server-params {}: {}", raw, e),
        }
        // evaluate right away so an activation does not wait a tick
        self.poll();
        // always re-broadcast the authoritative state for every control view
        self.broadcast_params();
    }

    fn store_client_params(&mut self, store: ClientParamsStore) -> () {
        info!(
            "storing calibration for '{}' ({}): {:?}",
            store.user_agent, store.output, store.data
        );
        self.store.store(&store.user_agent, &store.output, store.data);
    }

    fn send_client_params(&mut self, conn: ConnId, key: &ClientKey) -> () {
        match self.store.latest(&key.user_agent, &key.output) {
            Some(profile) => self.bus.send_to(conn, &BusMessage::ClientParams(profile)),
            None => debug!("no calibration for '{}' ({})", key.user_agent, key.output),
        }
    }

    fn broadcast_params(&mut self) -> () {
        let params = self.metronome.params();
        self.bus.publish(&BusMessage::ServerParams(params.as_json()));
    }
}

/// To start a click server, call this function with the settings file name.
///
/// Never returns unless the listener cannot be set up.
pub fn run(config_file: &str, port_override: Option<u16>) -> Result<(), BoxError> {
    let config = Config::build(config_file.to_string(), ServerSettings::default_params())?;
    let mut settings = ServerSettings::from_config(&config)?;
    if let Some(port) = port_override {
        settings.port = port;
    }
    info!("click server settings: {:?}", settings);

    let clock = MonotonicClock::new();
    let (inbound_tx, inbound_rx) = mpsc::channel();
    let _listen_handle = connection::listen(settings.port, clock, inbound_tx)?;
    info!("Server listening at port {}", settings.port);

    let metronome = Metronome::new(&settings.params, settings.tick_interval);
    let store = CalibrationStore::load(&settings.calibration_file);
    let mut server = ClickServer::new(clock, ChannelBus::new(), metronome, store);
    server.start(settings.params.active);

    loop {
        for inbound in inbound_rx.try_iter() {
            server.handle_inbound(inbound);
        }
        server.poll();
        // well under the tick interval
        sleep(Duration::new(0, 500_000));
    }
}
