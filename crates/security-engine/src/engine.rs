//! Core security engine

use crate::alarm;
use crate::config::EngineConfig;
use crate::controls;
use crate::dispatcher::CommandDispatcher;
use crate::display;
use crate::door;
use crate::error::EngineError;
use crate::model::{RgbState, StateSnapshot};
use crate::occupancy;
use crate::outbox::{AlarmAudit, Deferred, Outbox, TimerOp};
use crate::pin;
use crate::scheduler::Scheduler;
use crate::state::{Handler, HomeState};
use crate::timer;
use parking_lot::Mutex;
use sensor_protocol::adapter::now_seconds;
use sensor_protocol::command::DOOR_LIGHT;
use sensor_protocol::{decode_payload, CommandTransport, Point, Scalar, SensorEvent, TimeSeriesSink};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// Scheduler key of the countdown tick loop
pub const TICK_KEY: &str = "countdown-tick";
/// Scheduler key of the finished-countdown flash loop
pub const FLASH_KEY: &str = "countdown-flash";
/// Scheduler key of the LCD rotation loop
pub const DISPLAY_KEY: &str = "display-refresh";

/// Measurement of alarm audit points
pub const ALARM_MEASUREMENT: &str = "Alarm";
/// Measurement of state snapshot points
pub const STATE_MEASUREMENT: &str = "State";

/// `device` tag of points written by the engine itself
pub const ENGINE_DEVICE: &str = "engine";
/// `code` tag of points written by the engine itself
pub const ENGINE_CODE: &str = "ALARM";

const SNAPSHOT_CAPACITY: usize = 64;

/// Rule handlers, in evaluation order
const HANDLERS: &[(&str, Handler)] = &[
    ("occupancy", occupancy::on_event),
    ("door", door::on_event),
    ("intrusion", alarm::on_event),
    ("keypad", pin::on_event),
    ("controls", controls::on_event),
];

/// The main security engine.
///
/// All rule state sits behind one lock. Operations collect their side
/// effects in an [`Outbox`] and the engine applies it once the lock is
/// released: commands go to the dispatcher, audits and snapshots to the
/// sink, timer operations to the scheduler. Outboxes are applied in the
/// order their operations took the state lock.
pub struct HomeEngine {
    config: EngineConfig,
    state: Mutex<HomeState>,
    /// Serializes outbox application; taken while `state` is still held
    apply_lock: Mutex<()>,
    dispatcher: CommandDispatcher,
    sink: Arc<dyn TimeSeriesSink>,
    scheduler: Scheduler,
    /// Snapshot broadcaster, fed on every touch
    state_tx: broadcast::Sender<StateSnapshot>,
    /// Handle given to deferred tasks so they lapse with the engine
    weak: Weak<HomeEngine>,
}

impl HomeEngine {
    /// Create a new engine
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] when `config` fails validation.
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn CommandTransport>,
        sink: Arc<dyn TimeSeriesSink>,
    ) -> Result<Arc<Self>, EngineError> {
        let config = config.validated()?;
        let (state_tx, _) = broadcast::channel(SNAPSHOT_CAPACITY);
        let dispatcher =
            CommandDispatcher::new(transport, config.actuator_targets.clone(), config.pi.clone());

        Ok(Arc::new_cyclic(|weak| Self {
            state: Mutex::new(HomeState::new(&config)),
            apply_lock: Mutex::new(()),
            config,
            dispatcher,
            sink,
            scheduler: Scheduler::new(),
            state_tx,
            weak: weak.clone(),
        }))
    }

    /// Start the periodic loops (countdown tick, flash, LCD rotation)
    pub fn start(&self) {
        self.every(TICK_KEY, self.config.tick_period(), Self::tick);
        self.every(FLASH_KEY, self.config.flash_period(), Self::flash);
        self.every(DISPLAY_KEY, self.config.display_period(), Self::refresh_display);
        tracing::info!("Security engine started");
    }

    /// Cancel every scheduled task
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
        tracing::info!("Security engine stopped");
    }

    fn every(&self, key: &str, period: std::time::Duration, action: fn(&Self)) {
        let engine = self.weak.clone();
        self.scheduler.schedule_interval(key, period, move || {
            if let Some(engine) = engine.upgrade() {
                action(&engine);
            }
        });
    }

    /// Engine configuration (validated)
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to state snapshots
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.state_tx.subscribe()
    }

    /// Consistent copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.lock().snapshot()
    }

    /// Number of pending timers and loops
    #[must_use]
    pub fn scheduled_tasks(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Decode a raw payload and handle every reading in it
    ///
    /// # Errors
    ///
    /// Only decoding errors are returned; rule failures are logged.
    pub fn ingest(&self, payload: &str) -> Result<usize, EngineError> {
        let events = decode_payload(payload)?;
        let count = events.len();
        self.handle_batch(events);
        Ok(count)
    }

    /// Handle readings in order
    pub fn handle_batch(&self, events: impl IntoIterator<Item = SensorEvent>) {
        for event in events {
            self.handle(&event);
        }
    }

    /// Handle one sensor reading
    pub fn handle(&self, event: &SensorEvent) {
        if !self.config.is_enabled(&event.code) {
            tracing::debug!("Ignoring reading from disabled device {}", event.code);
            return;
        }

        tracing::debug!("Reading {} = {:?}", event.code, event.value);
        self.sink.write(Point::from_event(event));

        let result = self.run(|state, config, out| {
            state.devices.apply(event);
            out.touch();
            for &(name, handler) in HANDLERS {
                if let Err(e) = handler(state, config, event, out) {
                    tracing::error!("{} handler failed for {}: {}", name, event.code, e);
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::error!("Failed to handle reading from {}: {}", event.code, e);
        }
    }

    fn check_pin(&self, pin: &str) -> Result<(), EngineError> {
        if pin == self.config.pin {
            Ok(())
        } else {
            tracing::warn!("Rejected command with wrong PIN");
            Err(EngineError::Unauthorized)
        }
    }

    /// Authenticated arm request
    ///
    /// # Errors
    ///
    /// [`EngineError::Unauthorized`] on a wrong PIN, [`EngineError::AlarmActive`]
    /// while an alarm is sounding.
    pub fn arm(&self, pin: &str) -> Result<StateSnapshot, EngineError> {
        self.check_pin(pin)?;
        self.mutate(|state, config, out| state.security.request_arm(config.arm_delay(), out))
    }

    /// Authenticated disarm: cancels a pending arm and clears any alarm
    pub fn disarm(&self, pin: &str) -> Result<StateSnapshot, EngineError> {
        self.check_pin(pin)?;
        self.mutate(|state, _, out| {
            state.disarm(out);
            Ok(())
        })
    }

    /// Authenticated alarm stop: clears the alarm and disarms
    pub fn stop_alarm(&self, pin: &str) -> Result<StateSnapshot, EngineError> {
        self.check_pin(pin)?;
        self.mutate(|state, _, out| {
            if !state.security.alarm_active() {
                tracing::debug!("Stop requested with no active alarm");
            }
            state.disarm(out);
            Ok(())
        })
    }

    /// Manual alarm trigger; needs no PIN
    pub fn trigger_alarm(&self, reason: &str) -> Result<StateSnapshot, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::InvalidArgument(
                "alarm reason must not be empty".to_string(),
            ));
        }
        self.mutate(|state, _, out| {
            state.security.trigger(reason, out);
            Ok(())
        })
    }

    /// Apply a signed change to the people count
    pub fn adjust_people(&self, delta: i64) -> Result<StateSnapshot, EngineError> {
        self.mutate(|state, _, out| {
            state.security.adjust_people(delta, out);
            Ok(())
        })
    }

    /// Set the RGB strip colour
    pub fn set_rgb(&self, rgb: RgbState) -> Result<StateSnapshot, EngineError> {
        self.mutate(|state, _, out| {
            controls::apply_rgb(state, rgb, out);
            Ok(())
        })
    }

    /// Start the countdown from a number of seconds
    pub fn timer_set(&self, seconds: &serde_json::Value) -> Result<StateSnapshot, EngineError> {
        let seconds = timer::parse_seconds(seconds)?;
        self.mutate(|state, _, out| {
            state.timer.set(seconds, out);
            Ok(())
        })
    }

    /// Add the configured increment to the countdown
    pub fn timer_add(&self) -> Result<StateSnapshot, EngineError> {
        self.mutate(|state, _, out| {
            state.timer.add(out);
            Ok(())
        })
    }

    /// Change the countdown increment
    pub fn timer_set_increment(&self, seconds: &serde_json::Value) -> Result<StateSnapshot, EngineError> {
        let seconds = timer::parse_seconds(seconds)?;
        self.mutate(|state, _, out| {
            state.timer.set_increment(seconds, out);
            Ok(())
        })
    }

    /// Stop the countdown
    pub fn timer_stop(&self) -> Result<StateSnapshot, EngineError> {
        self.mutate(|state, _, out| {
            state.timer.stop(out);
            Ok(())
        })
    }

    fn tick(&self) {
        self.quietly("tick", |state, _, out| state.timer.tick(out));
    }

    fn flash(&self) {
        self.quietly("flash", |state, _, out| state.timer.flash(out));
    }

    fn refresh_display(&self) {
        self.quietly("display", display::refresh);
    }

    fn fire(&self, action: Deferred) {
        tracing::debug!("Deferred action {:?} fired", action);
        self.quietly("deferred", |state, _, out| match action {
            Deferred::CompleteArm { epoch } => {
                state.security.complete_arm(epoch, out);
            }
            Deferred::EntryCheck { code, epoch } => alarm::entry_check(state, &code, epoch, out),
            Deferred::LightOff => out.command(DOOR_LIGHT, "off", Vec::new()),
        });
    }

    /// Run an infallible background operation
    fn quietly(&self, name: &str, op: impl FnOnce(&mut HomeState, &EngineConfig, &mut Outbox)) {
        let result = self.run(|state, config, out| {
            op(state, config, out);
            Ok(())
        });
        if let Err(e) = result {
            tracing::error!("Background {} failed: {}", name, e);
        }
    }

    fn mutate(
        &self,
        op: impl FnOnce(&mut HomeState, &EngineConfig, &mut Outbox) -> Result<(), EngineError>,
    ) -> Result<StateSnapshot, EngineError> {
        self.run(op).map(|((), snapshot)| snapshot)
    }

    /// Run `op` under the state lock, then apply its effects.
    ///
    /// A failing operation must not have changed state; its outbox is dropped.
    fn run<T>(
        &self,
        op: impl FnOnce(&mut HomeState, &EngineConfig, &mut Outbox) -> Result<T, EngineError>,
    ) -> Result<(T, StateSnapshot), EngineError> {
        let mut out = Outbox::new();
        let (value, snapshot, _ordered) = {
            let mut state = self.state.lock();
            let value = op(&mut *state, &self.config, &mut out)?;
            if out.is_touched() {
                state.last_update = now_seconds();
            }
            // Lock order is state then apply, never the reverse
            let ordered = self.apply_lock.lock();
            (value, state.snapshot(), ordered)
        };

        self.apply(out, &snapshot);
        Ok((value, snapshot))
    }

    fn apply(&self, out: Outbox, snapshot: &StateSnapshot) {
        self.dispatcher.dispatch_all(&out.commands);

        for audit in &out.audits {
            tracing::info!("Alarm {}: {}", audit.transition.as_str(), audit.reason);
            self.sink.write(self.audit_point(audit, snapshot.last_update_ts));
        }

        for op in out.timers {
            self.apply_timer(op);
        }

        if out.touched {
            self.sink.write(self.state_point(snapshot));
            // No receivers is fine
            let _ = self.state_tx.send(snapshot.clone());
        }
    }

    fn apply_timer(&self, op: TimerOp) {
        match op {
            TimerOp::Schedule { key, delay, action } => {
                let engine = self.weak.clone();
                self.scheduler.schedule(&key, delay, move || {
                    if let Some(engine) = engine.upgrade() {
                        engine.fire(action);
                    }
                });
            }
            TimerOp::ScheduleIfIdle { key, delay, action } => {
                let engine = self.weak.clone();
                self.scheduler.schedule_if_idle(&key, delay, move || {
                    if let Some(engine) = engine.upgrade() {
                        engine.fire(action);
                    }
                });
            }
            TimerOp::Cancel(key) => {
                self.scheduler.cancel(&key);
            }
            TimerOp::CancelPrefix(prefix) => {
                self.scheduler.cancel_prefix(&prefix);
            }
        }
    }

    fn engine_point(&self, measurement: &str, timestamp: f64) -> Point {
        Point::new(measurement, timestamp)
            .tag("pi", &self.config.pi)
            .tag("device", ENGINE_DEVICE)
            .tag("code", ENGINE_CODE)
            .tag("simulated", "false")
    }

    fn audit_point(&self, audit: &AlarmAudit, timestamp: f64) -> Point {
        self.engine_point(ALARM_MEASUREMENT, timestamp)
            .field("event", Scalar::Text(audit.transition.as_str().to_string()))
            .field("reason", Scalar::Text(audit.reason.clone()))
    }

    fn state_point(&self, snapshot: &StateSnapshot) -> Point {
        self.engine_point(STATE_MEASUREMENT, snapshot.last_update_ts)
            .field("armed", Scalar::Bool(snapshot.armed))
            .field("arm_pending", Scalar::Bool(snapshot.arm_pending))
            .field("alarm", Scalar::Bool(snapshot.alarm))
            .field("alarm_reason", Scalar::Text(snapshot.last_alarm_reason.clone()))
            .field("people_count", Scalar::Int(i64::from(snapshot.people_count)))
            .field("timer_seconds_left", Scalar::Int(i64::from(snapshot.timer.seconds_left)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlarmPhase, MOVEMENT_REASON};
    use crate::testing::{event, harness, harness_with};
    use home_core::DeviceConfig;
    use serde_json::json;
    use std::time::Duration;

    async fn advance(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    fn press_pin(engine: &HomeEngine, pin: &str) {
        for key in pin.chars() {
            engine.handle(&event("DMS", "MembraneSwitch", json!(key.to_string()), 1.0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_waits_for_delay() {
        let h = harness();

        let snapshot = h.engine.arm("1234").unwrap();
        assert!(snapshot.arm_pending);
        assert_eq!(snapshot.phase, AlarmPhase::ArmPending);

        advance(9.5).await;
        assert!(!h.engine.snapshot().armed);

        advance(1.0).await;
        let snapshot = h.engine.snapshot();
        assert!(snapshot.armed);
        assert!(!snapshot.arm_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_during_pending_prevents_arming() {
        let h = harness();

        h.engine.arm("1234").unwrap();
        advance(5.0).await;
        h.engine.disarm("1234").unwrap();

        advance(10.0).await;
        let snapshot = h.engine.snapshot();
        assert!(!snapshot.armed);
        assert_eq!(snapshot.phase, AlarmPhase::Disarmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_arm_restarts_delay() {
        let h = harness();

        h.engine.arm("1234").unwrap();
        advance(6.0).await;
        h.engine.arm("1234").unwrap();

        advance(6.0).await;
        assert!(!h.engine.snapshot().armed);
        advance(5.0).await;
        assert!(h.engine.snapshot().armed);
    }

    #[tokio::test]
    async fn test_wrong_pin_is_rejected() {
        let h = harness();

        assert!(matches!(h.engine.arm("0000"), Err(EngineError::Unauthorized)));
        assert!(matches!(h.engine.disarm("12345"), Err(EngineError::Unauthorized)));
        assert!(!h.engine.snapshot().arm_pending);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_arm_during_alarm_is_rejected() {
        let h = harness();
        h.engine.trigger_alarm("manual").unwrap();

        assert!(matches!(h.engine.arm("1234"), Err(EngineError::AlarmActive(_))));
    }

    #[tokio::test]
    async fn test_accelerometer_raises_single_alarm() {
        let h = harness();

        let shake = json!({"accel_x": 2, "accel_y": 2, "accel_z": 2});
        h.engine.handle(&event("GSG", "Gyroscope", shake.clone(), 1.0));
        h.engine.handle(&event("GSG", "Gyroscope", shake, 2.0));

        let snapshot = h.engine.snapshot();
        assert!(snapshot.alarm);
        assert!(!snapshot.armed);
        assert_eq!(snapshot.last_alarm_reason, MOVEMENT_REASON);
        assert_eq!(h.transport.count("db on"), 1);

        let audits = h.sink.bucket("alarm");
        assert_eq!(audits.len(), 1);
        assert_eq!(
            audits[0].fields["reason"],
            Scalar::Text(MOVEMENT_REASON.to_string())
        );
    }

    #[tokio::test]
    async fn test_keypad_pin_during_alarm_clears_and_disarms() {
        let h = harness();
        h.engine.trigger_alarm("manual").unwrap();

        press_pin(&h.engine, "12");
        press_pin(&h.engine, "34");

        let snapshot = h.engine.snapshot();
        assert!(!snapshot.alarm);
        assert!(!snapshot.armed);
        assert_eq!(h.transport.count("db off"), 1);

        let audits = h.sink.bucket("alarm");
        assert_eq!(audits.len(), 2);
        assert_eq!(audits[1].fields["event"], Scalar::Text("exited".to_string()));
        assert_eq!(audits[1].fields["reason"], Scalar::Text("manual".to_string()));
    }

    #[tokio::test]
    async fn test_wrong_keypad_pin_leaves_state() {
        let h = harness();
        h.engine.trigger_alarm("manual").unwrap();

        press_pin(&h.engine, "4321");
        assert!(h.engine.snapshot().alarm);
        assert_eq!(h.transport.count("db off"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_entry_after_delay() {
        let h = harness();
        h.engine.arm("1234").unwrap();
        advance(11.0).await;
        assert!(h.engine.snapshot().armed);

        h.engine.handle(&event("DS1", "Door", json!("open"), 100.0));
        h.engine.handle(&event("DS1", "Door", json!("closed"), 101.0));
        advance(9.0).await;
        assert!(!h.engine.snapshot().alarm);

        advance(2.0).await;
        let snapshot = h.engine.snapshot();
        assert!(snapshot.alarm);
        assert_eq!(snapshot.last_alarm_reason, "unauthorized_entry_DS1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_within_entry_delay_prevents_alarm() {
        let h = harness();
        h.engine.arm("1234").unwrap();
        advance(11.0).await;

        h.engine.handle(&event("DS2", "Door", json!("open"), 100.0));
        advance(4.0).await;
        press_pin(&h.engine, "1234");

        advance(10.0).await;
        let snapshot = h.engine.snapshot();
        assert!(!snapshot.alarm);
        assert!(!snapshot.armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_check_after_rearm() {
        let h = harness();
        h.engine.arm("1234").unwrap();
        advance(11.0).await;
        h.engine.handle(&event("DS1", "Door", json!("open"), 100.0));

        h.engine.disarm("1234").unwrap();
        h.engine.arm("1234").unwrap();
        advance(11.0).await;

        assert!(h.engine.snapshot().armed);
        assert!(!h.engine.snapshot().alarm);
    }

    #[tokio::test]
    async fn test_door_open_too_long_while_disarmed() {
        let h = harness();

        h.engine.handle(&event("DS1", "Door", json!("open"), 0.0));
        h.engine.handle(&event("DS1", "Door", json!("open"), 6.0));
        h.engine.handle(&event("DS1", "Door", json!("open"), 7.0));
        assert_eq!(h.engine.snapshot().last_alarm_reason, "door_DS1_open_too_long");
        assert_eq!(h.transport.count("db on"), 1);

        h.engine.handle(&event("DS1", "Door", json!("closed"), 8.0));
        assert!(!h.engine.snapshot().alarm);
        assert_eq!(h.transport.count("db off"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_motion_light_turns_off() {
        let h = harness();

        h.engine.handle(&event("DPIR1", "Motion", json!(true), 1.0));
        assert_eq!(h.transport.count("dl on"), 1);

        advance(6.0).await;
        h.engine.handle(&event("DPIR1", "Motion", json!(true), 7.0));
        advance(6.0).await;
        assert_eq!(h.transport.count("dl off"), 0);

        advance(5.0).await;
        assert_eq!(h.transport.count("dl off"), 1);
    }

    #[tokio::test]
    async fn test_occupancy_through_engine() {
        let h = harness();

        h.engine.handle(&event("DUS1", "Ultrasonic", json!(50), 1.0));
        h.engine.handle(&event("DUS1", "Ultrasonic", json!(30), 2.0));
        h.engine.handle(&event("DPIR1", "Motion", json!(true), 3.0));
        assert_eq!(h.engine.snapshot().people_count, 1);

        h.engine.handle(&event("RPIR1", "Motion", json!(true), 4.0));
        assert!(!h.engine.snapshot().alarm);

        h.engine.adjust_people(-5).unwrap();
        h.engine.handle(&event("RPIR3", "Motion", json!(true), 5.0));
        assert_eq!(h.engine.snapshot().last_alarm_reason, "motion_when_empty_RPIR3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_loops() {
        let h = harness();
        h.engine.start();

        h.engine.timer_set(&json!(3)).unwrap();
        advance(3.2).await;
        let snapshot = h.engine.snapshot();
        assert!(snapshot.timer.finished);
        assert!(!snapshot.timer.running);

        advance(1.0).await;
        assert!(h.transport.count("4sd blank") >= 1);

        h.engine.handle(&event("BTN", "Button", json!(true), 1.0));
        assert!(!h.engine.snapshot().timer.finished);
        let blanks = h.transport.count("4sd blank");
        advance(2.0).await;
        assert_eq!(h.transport.count("4sd blank"), blanks);

        h.engine.shutdown();
        assert_eq!(h.engine.scheduled_tasks(), 0);
    }

    #[tokio::test]
    async fn test_timer_rejects_bad_seconds() {
        let h = harness();

        assert!(matches!(
            h.engine.timer_set(&json!("ten")),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.engine.timer_set_increment(&json!(-3)),
            Err(EngineError::InvalidArgument(_))
        ));

        let snapshot = h.engine.timer_set_increment(&json!("30")).unwrap();
        assert_eq!(snapshot.timer.add_seconds, 30);
        let snapshot = h.engine.timer_add().unwrap();
        assert_eq!(snapshot.timer.seconds_left, 30);
        let snapshot = h.engine.timer_stop().unwrap();
        assert!(!snapshot.timer.running);
        assert_eq!(snapshot.timer.seconds_left, 30);
    }

    #[tokio::test]
    async fn test_trigger_requires_reason() {
        let h = harness();

        assert!(matches!(
            h.engine.trigger_alarm("  "),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(!h.engine.snapshot().alarm);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let config = EngineConfig {
            ir_code: "DS1".to_string(),
            ..EngineConfig::default()
        };
        let h = harness_with(config);

        h.engine.handle(&event("DS1", "Door", json!("red"), 1.0));
        assert!(h.engine.snapshot().rgb.on);
        assert_eq!(h.transport.lines(), vec!["brgb 255 0 0"]);
    }

    #[tokio::test]
    async fn test_disabled_device_is_dropped() {
        let mut config = EngineConfig::default();
        config.devices.insert(
            "GSG".to_string(),
            DeviceConfig {
                enabled: false,
                ..DeviceConfig::default()
            },
        );
        let h = harness_with(config);

        h.engine.handle(&event("GSG", "Gyroscope", json!({"accel_x": 9, "accel_y": 9, "accel_z": 9}), 1.0));
        let snapshot = h.engine.snapshot();
        assert!(!snapshot.alarm);
        assert!(snapshot.devices.is_empty());
        assert!(h.sink.points().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_payloads() {
        let h = harness();

        let count = h
            .engine
            .ingest(r#"[{"code": "dht1", "measurement": "DHT", "value": {"temperature": 21}}, {"value": 1}]"#)
            .unwrap();
        assert_eq!(count, 1);
        assert!(h.engine.snapshot().devices.contains_key("DHT1"));
        assert_eq!(h.sink.bucket("dht").len(), 1);

        assert!(matches!(h.engine.ingest("not json"), Err(EngineError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_touch_broadcasts_and_persists_snapshot() {
        let h = harness();
        let mut rx = h.engine.subscribe();

        h.engine.set_rgb(RgbState { on: true, r: 1, g: 2, b: 3 }).unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.rgb, RgbState { on: true, r: 1, g: 2, b: 3 });
        assert!(snapshot.last_update_ts > 0.0);
        assert_eq!(h.sink.bucket("state").len(), 1);
        assert_eq!(h.transport.lines(), vec!["brgb 1 2 3"]);
    }

    #[tokio::test]
    async fn test_engine_points_share_sensor_tag_schema() {
        let h = harness();
        h.engine.trigger_alarm("manual").unwrap();

        let reading = Point::from_event(&event("DS1", "Door", json!(true), 1.0));
        let written = [h.sink.bucket("alarm"), h.sink.bucket("state")].concat();
        assert_eq!(written.len(), 2);
        for point in written {
            assert_eq!(
                point.tags.keys().collect::<Vec<_>>(),
                reading.tags.keys().collect::<Vec<_>>()
            );
            assert_eq!(point.tags["code"], ENGINE_CODE);
            assert_eq!(point.tags["device"], ENGINE_DEVICE);
            assert_eq!(point.tags["simulated"], "false");
            assert_eq!(point.tags["pi"], "PI1");
        }
    }

    /// Transport that stalls on `db on`
    #[derive(Default)]
    struct SlowBuzzer {
        lines: parking_lot::Mutex<Vec<String>>,
    }

    impl CommandTransport for SlowBuzzer {
        fn send(
            &self,
            command: &sensor_protocol::ActuatorCommand,
        ) -> Result<(), sensor_protocol::ProtocolError> {
            let line = command.line();
            if line == "db on" {
                std::thread::sleep(Duration::from_millis(100));
            }
            self.lines.lock().push(line);
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_operations_dispatch_in_decision_order() {
        let transport = Arc::new(SlowBuzzer::default());
        let engine = HomeEngine::new(
            EngineConfig::default(),
            transport.clone(),
            Arc::new(sensor_protocol::transport::NullSink),
        )
        .unwrap();

        let trigger = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.trigger_alarm("manual"))
        };
        std::thread::sleep(Duration::from_millis(20));
        engine.stop_alarm("1234").unwrap();
        trigger.join().unwrap().unwrap();

        assert!(!engine.snapshot().alarm);
        assert_eq!(*transport.lines.lock(), vec!["db on", "db off"]);
    }

    #[tokio::test]
    async fn test_commands_routed_to_configured_target() {
        let mut config = EngineConfig::default();
        config.actuator_targets.insert("DB".to_string(), "PI3".to_string());
        let h = harness_with(config);

        h.engine.trigger_alarm("manual").unwrap();
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device, "PI3");
    }
}
