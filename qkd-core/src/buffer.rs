//! Per-link key buffer with threshold-based status
//!
//! A [`KeyBuffer`] tracks how many key bits a link endpoint believes it has.
//! Production (`add_new_content`) comes from the simulated QKD link, consumption
//! (`process_outgoing_request` / `process_incoming_request`) from the crypto
//! engine. Every content change re-evaluates the buffer status:
//!
//! | condition                                                        | status   |
//! |------------------------------------------------------------------|----------|
//! | `current >= threshold`                                           | Ready    |
//! | `min < current < threshold` and (rising and previous != Ready, or previous == Empty) | Charging |
//! | `min < current < threshold` and previous != Charging             | Warning  |
//! | `current <= min`                                                 | Empty    |
//!
//! Rows are tried top to bottom. When none matches the status is left as it was.

use crate::key::KeyMaterial;
use crate::scheduler::{SimClock, SimTime};
use crate::{Error, IdSpace, Result};
use bytes::Bytes;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Buffer status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBufferStatus {
    Ready,
    Warning,
    Charging,
    Empty,
}

impl fmt::Display for KeyBufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Warning => "WARNING",
            Self::Charging => "CHARGING",
            Self::Empty => "EMPTY",
        };
        f.write_str(name)
    }
}

/// Amounts of key material, in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub min: u64,
    pub threshold: u64,
    pub max: u64,
    pub current: u64,
}

impl BufferLimits {
    pub fn validate(&self) -> Result<()> {
        if self.min > self.threshold || self.threshold > self.max {
            return Err(Error::Validation(format!(
                "buffer limits must satisfy min <= threshold <= max (got {} / {} / {})",
                self.min, self.threshold, self.max
            )));
        }
        if self.current > self.max {
            return Err(Error::Validation(format!(
                "initial content {} exceeds max {}",
                self.current, self.max
            )));
        }
        Ok(())
    }
}

/// Tunables shared by every buffer of a simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSettings {
    /// Number of recent content samples used to detect a rising curve
    pub curve_window: usize,
    /// Number of inter-charge periods kept for the moving average
    pub max_recorded_charging_periods: usize,
    /// Interval of the periodic average-amount recalculation
    pub recalculate_period: Duration,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            curve_window: 5,
            max_recorded_charging_periods: 5,
            recalculate_period: Duration::from_secs(5),
        }
    }
}

/// Change notifications delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    CurrentChanged { old: u64, new: u64 },
    ContentDiscarded { amount: u64, current: u64 },
    MinChanged { old: u64, new: u64 },
    ThresholdIncreased { old: u64, new: u64 },
    ThresholdDecreased { old: u64, new: u64 },
    MaxChanged { old: u64, new: u64 },
    StatusChanged { from: KeyBufferStatus, to: KeyBufferStatus },
    AverageRecalculated { value: i64 },
}

type Observer = Box<dyn FnMut(u32, &BufferEvent)>;

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: u64,
    seq: u64,
}

/// Monitoring view of a buffer
#[derive(Debug, Clone, Serialize)]
pub struct KeyBufferSnapshot {
    pub id: u32,
    pub src_node: u32,
    pub dst_node: u32,
    pub min: u64,
    pub threshold: u64,
    pub max: u64,
    pub current: u64,
    pub status: KeyBufferStatus,
    pub previous_status: KeyBufferStatus,
    pub bits_charged_in_period: u64,
    pub bits_used_in_period: u64,
    pub average_charging_period_ms: Option<f64>,
    pub average_key_amount: i64,
    pub status_transitions: u64,
}

/// Pure status transition function
///
/// Returns `None` for the combination the table does not cover (previous
/// status Charging, curve not rising, content between min and threshold).
pub fn evaluate_status(
    current: u64,
    min: u64,
    threshold: u64,
    previous: KeyBufferStatus,
    rising: bool,
) -> Option<KeyBufferStatus> {
    let in_band = current > min && current < threshold;

    if current >= threshold {
        Some(KeyBufferStatus::Ready)
    } else if in_band
        && ((rising && previous != KeyBufferStatus::Ready) || previous == KeyBufferStatus::Empty)
    {
        Some(KeyBufferStatus::Charging)
    } else if in_band && previous != KeyBufferStatus::Charging {
        Some(KeyBufferStatus::Warning)
    } else if current <= min {
        Some(KeyBufferStatus::Empty)
    } else {
        None
    }
}

/// Key material accounting for one link direction
pub struct KeyBuffer {
    id: u32,
    src_node: u32,
    dst_node: u32,
    min: u64,
    threshold: u64,
    max: u64,
    current: u64,
    status: KeyBufferStatus,
    previous_status: KeyBufferStatus,
    status_transitions: u64,
    settings: BufferSettings,
    clock: SimClock,
    ids: IdSpace,
    link_secret: Bytes,

    // Rising-curve detection: recent samples, sorted by value descending
    samples: Vec<Sample>,
    sample_seq: u64,

    bits_charged_in_period: u64,
    bits_used_in_period: u64,
    charging_periods: VecDeque<Duration>,
    average_charging_period: Option<Duration>,
    last_charge_at: Option<SimTime>,
    average_key_amount: i64,

    observers: Vec<Observer>,
}

impl KeyBuffer {
    /// Create a buffer; its id comes from `ids.buffers`
    pub fn new(
        ids: &IdSpace,
        clock: SimClock,
        src_node: u32,
        dst_node: u32,
        limits: BufferLimits,
        settings: BufferSettings,
        link_secret: impl Into<Bytes>,
    ) -> Result<Self> {
        limits.validate()?;
        let link_secret = link_secret.into();
        if link_secret.is_empty() {
            return Err(Error::Validation("link secret cannot be empty".to_string()));
        }
        if settings.curve_window == 0 || settings.max_recorded_charging_periods == 0 {
            return Err(Error::Validation(
                "curve_window and max_recorded_charging_periods must be > 0".to_string(),
            ));
        }

        let mut buffer = Self {
            id: ids.buffers.next_id(),
            src_node,
            dst_node,
            min: limits.min,
            threshold: limits.threshold,
            max: limits.max,
            current: limits.current,
            status: KeyBufferStatus::Empty,
            previous_status: KeyBufferStatus::Empty,
            status_transitions: 0,
            settings,
            clock,
            ids: ids.clone(),
            link_secret,
            samples: Vec::new(),
            sample_seq: 0,
            bits_charged_in_period: 0,
            bits_used_in_period: 0,
            charging_periods: VecDeque::new(),
            average_charging_period: None,
            last_charge_at: None,
            average_key_amount: 0,
            observers: Vec::new(),
        };
        buffer.record_sample();
        buffer.check_state();

        debug!(
            buffer = buffer.id,
            src = src_node,
            dst = dst_node,
            current = buffer.current,
            status = %buffer.status,
            "Key buffer created"
        );
        Ok(buffer)
    }

    /// Register a change observer; it receives the buffer id and the event
    pub fn subscribe(&mut self, observer: impl FnMut(u32, &BufferEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Store newly generated key material
    ///
    /// Material that would fill the buffer up to `max` is discarded and the
    /// call returns false; the buffer is left untouched.
    pub fn add_new_content(&mut self, size_bits: u32) -> bool {
        let amount = u64::from(size_bits);

        if self.current + amount >= self.max {
            trace!(
                buffer = self.id,
                amount,
                current = self.current,
                max = self.max,
                "Buffer full, discarding key material"
            );
            let event = BufferEvent::ContentDiscarded {
                amount,
                current: self.current,
            };
            self.emit(&event);
            return false;
        }

        let now = self.clock.now();
        if let Some(last) = self.last_charge_at {
            self.record_charging_period(now.saturating_sub(last));
        }
        self.last_charge_at = Some(now);

        let old = self.current;
        self.current += amount;
        self.bits_charged_in_period += amount;
        self.content_changed(old);
        true
    }

    /// Take a key for sending
    ///
    /// Fails when `current <= size_bits`. The key gets a fresh id.
    pub fn process_outgoing_request(&mut self, size_bits: u32) -> Option<KeyMaterial> {
        if self.current <= u64::from(size_bits) {
            debug!(
                buffer = self.id,
                requested = size_bits,
                current = self.current,
                "Not enough key material for outgoing request"
            );
            return None;
        }

        let key_id = self.ids.keys.next_id();
        self.issue_key(key_id, size_bits)
    }

    /// Take the key a peer used, identified by `key_id`
    pub fn process_incoming_request(&mut self, key_id: u32, size_bits: u32) -> Option<KeyMaterial> {
        if self.current <= u64::from(size_bits) {
            debug!(
                buffer = self.id,
                key_id,
                requested = size_bits,
                current = self.current,
                "Not enough key material for incoming request"
            );
            return None;
        }

        self.issue_key(key_id, size_bits)
    }

    /// Current status without re-evaluation
    pub fn fetch_state(&self) -> KeyBufferStatus {
        self.status
    }

    /// Re-evaluate the status table against the current content
    ///
    /// Pure with respect to the buffer content: calling it repeatedly without a
    /// mutation in between returns the same status.
    pub fn check_state(&mut self) -> KeyBufferStatus {
        let rising = self.is_rising();

        match evaluate_status(
            self.current,
            self.min,
            self.threshold,
            self.previous_status,
            rising,
        ) {
            Some(next) if next != self.status => {
                info!(
                    buffer = self.id,
                    from = %self.status,
                    to = %next,
                    current = self.current,
                    "Key buffer status changed"
                );
                let event = BufferEvent::StatusChanged {
                    from: self.status,
                    to: next,
                };
                self.status = next;
                self.status_transitions += 1;
                self.emit(&event);
            }
            Some(_) => {}
            None => {
                warn!(
                    buffer = self.id,
                    current = self.current,
                    min = self.min,
                    threshold = self.threshold,
                    previous = %self.previous_status,
                    rising,
                    "UNDEFINED buffer state, keeping {}",
                    self.status
                );
            }
        }
        self.status
    }

    /// Periodic freshness metric used by QoS-aware routing
    ///
    /// `(current - threshold) + (charged - used)` over the last period; resets
    /// the period counters.
    pub fn calculate_average_amount_of_key_in_the_buffer(&mut self) -> i64 {
        let level = self.current as i64 - self.threshold as i64;
        let trend = self.bits_charged_in_period as i64 - self.bits_used_in_period as i64;
        self.average_key_amount = level + trend;

        debug!(
            buffer = self.id,
            value = self.average_key_amount,
            charged = self.bits_charged_in_period,
            used = self.bits_used_in_period,
            "Recalculated average key amount"
        );

        self.bits_charged_in_period = 0;
        self.bits_used_in_period = 0;
        let event = BufferEvent::AverageRecalculated {
            value: self.average_key_amount,
        };
        self.emit(&event);
        self.average_key_amount
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn src_node(&self) -> u32 {
        self.src_node
    }

    pub fn dst_node(&self) -> u32 {
        self.dst_node
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn status(&self) -> KeyBufferStatus {
        self.status
    }

    pub fn previous_status(&self) -> KeyBufferStatus {
        self.previous_status
    }

    pub fn settings(&self) -> &BufferSettings {
        &self.settings
    }

    pub fn bits_charged_in_period(&self) -> u64 {
        self.bits_charged_in_period
    }

    pub fn bits_used_in_period(&self) -> u64 {
        self.bits_used_in_period
    }

    pub fn average_charging_period(&self) -> Option<Duration> {
        self.average_charging_period
    }

    pub fn charging_periods(&self) -> impl Iterator<Item = &Duration> {
        self.charging_periods.iter()
    }

    pub fn average_key_amount(&self) -> i64 {
        self.average_key_amount
    }

    pub fn set_min(&mut self, min: u64) -> Result<()> {
        self.check_limits(min, self.threshold, self.max, self.current)?;
        let old = self.min;
        self.min = min;
        self.emit(&BufferEvent::MinChanged { old, new: min });
        self.reevaluate();
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: u64) -> Result<()> {
        self.check_limits(self.min, threshold, self.max, self.current)?;
        let old = self.threshold;
        self.threshold = threshold;
        if threshold > old {
            self.emit(&BufferEvent::ThresholdIncreased { old, new: threshold });
        } else if threshold < old {
            self.emit(&BufferEvent::ThresholdDecreased { old, new: threshold });
        }
        self.reevaluate();
        Ok(())
    }

    pub fn set_max(&mut self, max: u64) -> Result<()> {
        self.check_limits(self.min, self.threshold, max, self.current)?;
        let old = self.max;
        self.max = max;
        self.emit(&BufferEvent::MaxChanged { old, new: max });
        Ok(())
    }

    pub fn set_current(&mut self, current: u64) -> Result<()> {
        self.check_limits(self.min, self.threshold, self.max, current)?;
        let old = self.current;
        self.current = current;
        self.content_changed(old);
        Ok(())
    }

    pub fn snapshot(&self) -> KeyBufferSnapshot {
        KeyBufferSnapshot {
            id: self.id,
            src_node: self.src_node,
            dst_node: self.dst_node,
            min: self.min,
            threshold: self.threshold,
            max: self.max,
            current: self.current,
            status: self.status,
            previous_status: self.previous_status,
            bits_charged_in_period: self.bits_charged_in_period,
            bits_used_in_period: self.bits_used_in_period,
            average_charging_period_ms: self
                .average_charging_period
                .map(|d| d.as_secs_f64() * 1000.0),
            average_key_amount: self.average_key_amount,
            status_transitions: self.status_transitions,
        }
    }

    fn issue_key(&mut self, key_id: u32, size_bits: u32) -> Option<KeyMaterial> {
        let key = match KeyMaterial::synthesize(key_id, size_bits, &self.link_secret) {
            Ok(key) => key,
            Err(e) => {
                warn!(buffer = self.id, key_id, "Failed to synthesize key: {}", e);
                return None;
            }
        };

        let old = self.current;
        let used = u64::from(key.size_bits());
        self.current -= used;
        self.bits_used_in_period += used;
        trace!(buffer = self.id, key_id, size_bits, "Key material consumed");
        self.content_changed(old);
        Some(key)
    }

    fn content_changed(&mut self, old: u64) {
        let event = BufferEvent::CurrentChanged {
            old,
            new: self.current,
        };
        self.emit(&event);
        self.record_sample();
        self.reevaluate();
    }

    fn reevaluate(&mut self) {
        self.previous_status = self.status;
        self.check_state();
    }

    fn record_sample(&mut self) {
        self.sample_seq += 1;
        self.samples.push(Sample {
            value: self.current,
            seq: self.sample_seq,
        });

        if self.samples.len() > self.settings.curve_window {
            if let Some(oldest) = self
                .samples
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.seq)
                .map(|(i, _)| i)
            {
                self.samples.remove(oldest);
            }
        }

        // Newest sample wins ties so a flat curve still counts as rising
        self.samples
            .sort_by(|a, b| b.value.cmp(&a.value).then(b.seq.cmp(&a.seq)));
    }

    fn is_rising(&self) -> bool {
        self.samples
            .first()
            .is_some_and(|top| top.seq == self.sample_seq)
    }

    fn record_charging_period(&mut self, period: Duration) {
        self.charging_periods.push_back(period);
        while self.charging_periods.len() > self.settings.max_recorded_charging_periods {
            self.charging_periods.pop_front();
        }

        let total: Duration = self.charging_periods.iter().sum();
        self.average_charging_period = Some(total / self.charging_periods.len() as u32);
    }

    fn check_limits(&self, min: u64, threshold: u64, max: u64, current: u64) -> Result<()> {
        BufferLimits {
            min,
            threshold,
            max,
            current,
        }
        .validate()
        .map_err(|e| Error::Buffer(format!("buffer {}: {}", self.id, e)))
    }

    fn emit(&mut self, event: &BufferEvent) {
        let id = self.id;
        for observer in self.observers.iter_mut() {
            observer(id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SECRET: &[u8] = b"buffer-test-secret";

    fn buffer(min: u64, threshold: u64, max: u64, current: u64) -> (KeyBuffer, SimClock) {
        let clock = SimClock::new();
        let buffer = KeyBuffer::new(
            &IdSpace::new(),
            clock.clone(),
            1,
            2,
            BufferLimits {
                min,
                threshold,
                max,
                current,
            },
            BufferSettings::default(),
            SECRET,
        )
        .unwrap();
        (buffer, clock)
    }

    #[test]
    fn test_full_buffer_discards_then_consumption_reaches_ready() {
        let (mut buffer, _) = buffer(1000, 2000, 5000, 5000);
        assert_eq!(buffer.status(), KeyBufferStatus::Ready);

        assert!(!buffer.add_new_content(10));
        assert_eq!(buffer.current(), 5000);

        let key = buffer.process_outgoing_request(3000).unwrap();
        assert_eq!(key.size_bits(), 3000);
        assert_eq!(buffer.current(), 2000);
        assert_eq!(buffer.status(), KeyBufferStatus::Ready);
    }

    #[test]
    fn test_consumption_requires_strictly_more_than_requested() {
        let (mut buffer, _) = buffer(100, 200, 5000, 1000);
        assert!(buffer.process_outgoing_request(1000).is_none());
        assert!(buffer.process_incoming_request(42, 1000).is_none());
        assert_eq!(buffer.current(), 1000);

        assert!(buffer.process_outgoing_request(999).is_some());
        assert_eq!(buffer.current(), 1);
    }

    #[test]
    fn test_peer_buffers_derive_identical_keys() {
        let (mut sender, _) = buffer(0, 100, 100_000, 50_000);
        let (mut receiver, _) = buffer(0, 100, 100_000, 50_000);

        let sent = sender.process_outgoing_request(256).unwrap();
        let received = receiver.process_incoming_request(sent.id(), 256).unwrap();
        assert_eq!(sent, received);
        assert_eq!(receiver.current(), 50_000 - 256);
    }

    #[test]
    fn test_status_lifecycle() {
        let (mut buffer, _) = buffer(1000, 2000, 10_000, 0);
        assert_eq!(buffer.status(), KeyBufferStatus::Empty);

        // Leaving EMPTY always means charging
        assert!(buffer.add_new_content(1500));
        assert_eq!(buffer.status(), KeyBufferStatus::Charging);

        assert!(buffer.add_new_content(1000));
        assert_eq!(buffer.status(), KeyBufferStatus::Ready);

        // Falling out of READY warns
        buffer.process_outgoing_request(1000).unwrap();
        assert_eq!(buffer.current(), 1500);
        assert_eq!(buffer.status(), KeyBufferStatus::Warning);
        assert_eq!(buffer.previous_status(), KeyBufferStatus::Ready);

        // The 2500 peak is still inside the 5-sample window: not rising yet
        assert!(buffer.add_new_content(100));
        assert_eq!(buffer.status(), KeyBufferStatus::Warning);
        assert!(buffer.add_new_content(10));
        assert!(buffer.add_new_content(10));
        assert_eq!(buffer.status(), KeyBufferStatus::Warning);

        // Peak slides out of the window, recovery counts as charging
        assert!(buffer.add_new_content(10));
        assert_eq!(buffer.current(), 1630);
        assert_eq!(buffer.status(), KeyBufferStatus::Charging);

        buffer.process_outgoing_request(700).unwrap();
        assert_eq!(buffer.current(), 930);
        assert_eq!(buffer.status(), KeyBufferStatus::Empty);
    }

    #[test]
    fn test_undefined_case_freezes_status() {
        let (mut buffer, _) = buffer(1000, 2000, 10_000, 0);
        buffer.add_new_content(1500);
        assert_eq!(buffer.status(), KeyBufferStatus::Charging);

        // Falling while charging matches no row of the table
        buffer.process_outgoing_request(100).unwrap();
        assert_eq!(buffer.status(), KeyBufferStatus::Charging);
        assert_eq!(
            evaluate_status(1400, 1000, 2000, KeyBufferStatus::Charging, false),
            None
        );
    }

    #[test]
    fn test_transition_table() {
        use KeyBufferStatus::*;
        assert_eq!(evaluate_status(2000, 1000, 2000, Empty, false), Some(Ready));
        assert_eq!(evaluate_status(1500, 1000, 2000, Empty, false), Some(Charging));
        assert_eq!(evaluate_status(1500, 1000, 2000, Warning, true), Some(Charging));
        assert_eq!(evaluate_status(1500, 1000, 2000, Ready, true), Some(Warning));
        assert_eq!(evaluate_status(1500, 1000, 2000, Ready, false), Some(Warning));
        assert_eq!(evaluate_status(1000, 1000, 2000, Ready, false), Some(Empty));
        assert_eq!(evaluate_status(0, 1000, 2000, Charging, true), Some(Empty));
    }

    #[test]
    fn test_check_state_is_idempotent() {
        let (mut buffer, _) = buffer(1000, 2000, 10_000, 2500);
        buffer.process_outgoing_request(1000).unwrap();
        let first = buffer.check_state();
        let second = buffer.check_state();
        assert_eq!(first, second);
        assert_eq!(buffer.fetch_state(), first);
    }

    #[test]
    fn test_charging_period_moving_average() {
        let (mut buffer, clock) = buffer(0, 100, 1_000_000, 0);

        buffer.add_new_content(10);
        assert!(buffer.average_charging_period().is_none());

        for _ in 0..7 {
            clock.advance(Duration::from_secs(1));
            buffer.add_new_content(10);
        }
        assert_eq!(buffer.charging_periods().count(), 5);
        assert_eq!(buffer.average_charging_period(), Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(6));
        buffer.add_new_content(10);
        // Window now holds 1, 1, 1, 1, 6 seconds
        assert_eq!(buffer.average_charging_period(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_discarded_content_is_not_a_charge() {
        let (mut buffer, clock) = buffer(0, 100, 1000, 0);
        buffer.add_new_content(500);
        clock.advance(Duration::from_secs(3));
        assert!(!buffer.add_new_content(600));
        assert!(buffer.average_charging_period().is_none());
        assert_eq!(buffer.bits_charged_in_period(), 500);
    }

    #[test]
    fn test_average_amount_recalculation() {
        let (mut buffer, _) = buffer(1000, 2000, 10_000, 2900);
        buffer.add_new_content(500);
        buffer.process_outgoing_request(400).unwrap();
        assert_eq!(buffer.current(), 3000);

        // (3000 - 2000) + (500 - 400)
        assert_eq!(buffer.calculate_average_amount_of_key_in_the_buffer(), 1100);
        assert_eq!(buffer.bits_charged_in_period(), 0);
        assert_eq!(buffer.bits_used_in_period(), 0);
        assert_eq!(buffer.calculate_average_amount_of_key_in_the_buffer(), 1000);
    }

    #[test]
    fn test_observers_see_threshold_direction() {
        let (mut buffer, _) = buffer(1000, 2000, 10_000, 2500);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        buffer.subscribe(move |_, event| sink.borrow_mut().push(event.clone()));

        buffer.set_threshold(3000).unwrap();
        buffer.set_threshold(2500).unwrap();

        let events = events.borrow();
        assert!(events.contains(&BufferEvent::ThresholdIncreased { old: 2000, new: 3000 }));
        assert!(events.contains(&BufferEvent::ThresholdDecreased { old: 3000, new: 2500 }));
        assert!(events.iter().any(|e| matches!(
            e,
            BufferEvent::StatusChanged {
                from: KeyBufferStatus::Ready,
                to: KeyBufferStatus::Warning
            }
        )));
    }

    #[test]
    fn test_observers_see_content_deltas() {
        let (mut buffer, _) = buffer(0, 100, 1000, 0);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        buffer.subscribe(move |_, event| sink.borrow_mut().push(event.clone()));

        buffer.add_new_content(300);
        buffer.add_new_content(900);

        let events = events.borrow();
        assert_eq!(events[0], BufferEvent::CurrentChanged { old: 0, new: 300 });
        assert!(events.contains(&BufferEvent::ContentDiscarded {
            amount: 900,
            current: 300
        }));
    }

    #[test]
    fn test_setters_validate_limits() {
        let (mut buffer, _) = buffer(1000, 2000, 5000, 3000);
        assert!(buffer.set_threshold(6000).is_err());
        assert!(buffer.set_min(2500).is_err());
        assert!(buffer.set_current(5001).is_err());
        assert!(buffer.set_max(4000).is_ok());
        assert_eq!(buffer.max(), 4000);
    }

    #[test]
    fn test_invalid_construction() {
        let limits = BufferLimits {
            min: 10,
            threshold: 5,
            max: 100,
            current: 0,
        };
        assert!(KeyBuffer::new(
            &IdSpace::new(),
            SimClock::new(),
            0,
            1,
            limits,
            BufferSettings::default(),
            SECRET
        )
        .is_err());
    }

    #[test]
    fn test_snapshot_serializes() {
        let (buffer, _) = buffer(1000, 2000, 5000, 2500);
        let json = serde_json::to_value(buffer.snapshot()).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["current"], 2500);
    }
}
