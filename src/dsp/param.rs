// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Sample-accurate parameter automation.
//!
//! A parameter holds a timeline of scheduled events. Between two events the value either
//! holds (after a set) or moves linearly toward the next event (before a linear ramp).
//! Times are in seconds on the engine's audio clock.

#[derive(Clone, Copy, Debug, PartialEq)]
enum Event {
    Set { value: f32, time: f64 },
    LinearRamp { value: f32, time: f64 },
}

impl Event {
    fn time(&self) -> f64 {
        match self {
            Event::Set { time, .. } | Event::LinearRamp { time, .. } => *time,
        }
    }

    fn value(&self) -> f32 {
        match self {
            Event::Set { value, .. } | Event::LinearRamp { value, .. } => *value,
        }
    }
}

/// A parameter whose value is a function of time.
#[derive(Clone, Debug)]
pub struct AutomationParam {
    default_value: f32,
    events: Vec<Event>,
}

impl AutomationParam {
    pub fn new(default_value: f32) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    /// Jumps to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::Set { value, time });
    }

    /// Moves linearly from the previous event's value to reach `value` at `time`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::LinearRamp { value, time });
    }

    /// Drops every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Returns the value at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        // Index of the first event strictly after `time`.
        let next = self.events.partition_point(|e| e.time() <= time);

        let (start_value, start_time) = match next.checked_sub(1).map(|i| self.events[i]) {
            Some(prev) => (prev.value(), prev.time()),
            None => (self.default_value, 0.0),
        };

        match self.events.get(next) {
            Some(Event::LinearRamp { value, time: end }) if *end > start_time => {
                let progress = ((time - start_time) / (end - start_time)).clamp(0.0, 1.0);
                start_value + (value - start_value) * progress as f32
            }
            _ => start_value,
        }
    }

    /// Forgets events that can no longer affect values at or after `time`.
    pub fn prune(&mut self, time: f64) {
        let next = self.events.partition_point(|e| e.time() <= time);
        if next > 1 {
            self.events.drain(..next - 1);
        }
    }

    /// The time of the last scheduled event, if any.
    pub fn last_event_time(&self) -> Option<f64> {
        self.events.last().map(Event::time)
    }

    fn insert(&mut self, event: Event) {
        if !event.time().is_finite() || !event.value().is_finite() {
            return;
        }
        // Events at the same time keep their scheduling order.
        let index = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(index, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_default_value() {
        let param = AutomationParam::new(0.25);
        assert_eq!(param.value_at(0.0), 0.25);
        assert_eq!(param.value_at(100.0), 0.25);
    }

    #[test]
    fn test_attack_decay_envelope() {
        let mut gain = AutomationParam::new(0.0);
        gain.set_value_at_time(0.0, 1.0);
        gain.linear_ramp_to_value_at_time(1.0, 1.1);
        gain.linear_ramp_to_value_at_time(0.5, 1.3);

        assert!(approx(gain.value_at(0.5), 0.0));
        assert!(approx(gain.value_at(1.0), 0.0));
        assert!(approx(gain.value_at(1.05), 0.5));
        assert!(approx(gain.value_at(1.1), 1.0));
        assert!(approx(gain.value_at(1.2), 0.75));
        assert!(approx(gain.value_at(2.0), 0.5));
    }

    #[test]
    fn test_cancel_and_release() {
        let mut gain = AutomationParam::new(0.0);
        gain.set_value_at_time(0.0, 0.0);
        gain.linear_ramp_to_value_at_time(1.0, 1.0);

        // Release half way through the attack.
        let now = 0.5;
        let current = gain.value_at(now);
        gain.cancel_scheduled_values(now);
        gain.set_value_at_time(current, now);
        gain.linear_ramp_to_value_at_time(0.0, now + 0.5);

        assert!(approx(gain.value_at(0.5), 0.5));
        assert!(approx(gain.value_at(0.75), 0.25));
        assert!(approx(gain.value_at(1.0), 0.0));
        assert!(approx(gain.value_at(5.0), 0.0));
    }

    #[test]
    fn test_prune_keeps_current_segment() {
        let mut gain = AutomationParam::new(0.0);
        gain.set_value_at_time(0.0, 0.0);
        gain.linear_ramp_to_value_at_time(1.0, 1.0);
        gain.linear_ramp_to_value_at_time(0.0, 2.0);

        let before = gain.value_at(1.5);
        gain.prune(1.2);
        assert!(approx(gain.value_at(1.5), before));
        assert_eq!(gain.last_event_time(), Some(2.0));
    }

    #[test]
    fn test_non_finite_events_ignored() {
        let mut param = AutomationParam::new(1.0);
        param.set_value_at_time(f32::NAN, 0.0);
        param.linear_ramp_to_value_at_time(0.0, f64::INFINITY);
        assert_eq!(param.value_at(1.0), 1.0);
        assert_eq!(param.last_event_time(), None);
    }
}
