//! NAS procedure timers
//!
//! Mobility management timers (T3502, T3510, T3511, T3517, T3521, T3525,
//! T3540, non-3GPP deregistration) and session management timers (T3580,
//! T3582, T3583), TS 24.501 Tables 10.2.1 and 10.3.1.
//!
//! A timer here is bookkeeping only; the dispatcher arms a tokio sleep for
//! every start and hands the expiry back with the generation it was armed
//! with. Starting or stopping a timer bumps its generation, so an expiry
//! from a superseded start is reported as [`TimerExpiry::Stale`].

use std::fmt;
use std::time::Duration;

use simamf_common::{RetryConfig, TimerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    T3502,
    T3510,
    T3511,
    T3517,
    T3521,
    T3525,
    T3540,
    Non3gppDeregistration,
    T3580,
    T3582,
    T3583,
}

impl TimerId {
    pub const ALL: [TimerId; 11] = [
        TimerId::T3502,
        TimerId::T3510,
        TimerId::T3511,
        TimerId::T3517,
        TimerId::T3521,
        TimerId::T3525,
        TimerId::T3540,
        TimerId::Non3gppDeregistration,
        TimerId::T3580,
        TimerId::T3582,
        TimerId::T3583,
    ];

    /// Whether this is a mobility management timer.
    pub fn is_mm(self) -> bool {
        !matches!(self, TimerId::T3580 | TimerId::T3582 | TimerId::T3583)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerId::Non3gppDeregistration => write!(f, "Non3GPPDeregistration"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// What an expiry means for the procedure the timer guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerExpiry {
    /// The timer was stopped or restarted after this expiry was armed.
    Stale,
    /// Resend the guarded PDU and keep the timer running.
    Retransmit { pdu: Vec<u8>, attempt: u32 },
    /// Nothing to resend; the timer is stopped.
    Expired,
    /// Retry ceiling reached; the procedure is abandoned.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct NasTimer {
    id: TimerId,
    interval: Duration,
    max_retries: u32,
    retries: u32,
    generation: u64,
    running: bool,
    guarded_pdu: Option<Vec<u8>>,
}

impl NasTimer {
    pub fn new(id: TimerId, interval: Duration, max_retries: u32) -> Self {
        Self {
            id,
            interval,
            max_retries,
            retries: 0,
            generation: 0,
            running: false,
            guarded_pdu: None,
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn start(&mut self, guarded_pdu: Option<Vec<u8>>) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.running = true;
        self.retries = 0;
        self.guarded_pdu = guarded_pdu;
        self.generation
    }

    fn stop(&mut self) {
        if self.running {
            self.generation = self.generation.wrapping_add(1);
        }
        self.running = false;
        self.retries = 0;
        self.guarded_pdu = None;
    }

    fn expire(&mut self, generation: u64) -> TimerExpiry {
        if !self.running || generation != self.generation {
            return TimerExpiry::Stale;
        }
        self.retries += 1;
        if self.retries > self.max_retries {
            let attempts = self.retries;
            self.stop();
            return TimerExpiry::Exhausted { attempts };
        }
        match &self.guarded_pdu {
            Some(pdu) => TimerExpiry::Retransmit {
                pdu: pdu.clone(),
                attempt: self.retries,
            },
            None => {
                self.stop();
                TimerExpiry::Expired
            }
        }
    }
}

/// Handle for one armed start of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    pub id: TimerId,
    pub generation: u64,
    pub interval: Duration,
}

/// All timers of one subscriber.
#[derive(Debug, Clone)]
pub struct TimerSet {
    timers: Vec<NasTimer>,
}

impl TimerSet {
    pub fn new(values: &TimerConfig, retries: &RetryConfig) -> Self {
        let secs = |s: u32| Duration::from_secs(u64::from(s));
        let timers = TimerId::ALL
            .iter()
            .map(|&id| {
                let (interval, max_retries) = match id {
                    TimerId::T3502 => (values.t3502, retries.registration_retry),
                    TimerId::T3510 => (values.t3510, retries.registration_attempt),
                    TimerId::T3511 => (values.t3511, retries.registration_retry),
                    TimerId::T3517 => (values.t3517, retries.service_attempt),
                    TimerId::T3521 => (values.t3521, retries.deregistration_retry),
                    TimerId::T3525 => (values.t3525, retries.service_attempt),
                    TimerId::T3540 => (values.t3540, 0),
                    TimerId::Non3gppDeregistration => {
                        (values.non_3gpp_deregistration, retries.deregistration_retry)
                    }
                    TimerId::T3580 => (values.t3580, retries.t3580),
                    TimerId::T3582 => (values.t3582, retries.t3582),
                    TimerId::T3583 => (values.t3583, retries.t3583),
                };
                NasTimer::new(id, secs(interval), max_retries)
            })
            .collect();
        Self { timers }
    }

    pub fn get(&self, id: TimerId) -> &NasTimer {
        &self.timers[id.index()]
    }

    pub fn get_mut(&mut self, id: TimerId) -> &mut NasTimer {
        &mut self.timers[id.index()]
    }

    /// Starts (or restarts) a timer, optionally guarding a PDU for
    /// retransmission. The retry count starts over.
    pub fn start(&mut self, id: TimerId, guarded_pdu: Option<Vec<u8>>) -> TimerTicket {
        let timer = self.get_mut(id);
        let generation = timer.start(guarded_pdu);
        TimerTicket {
            id,
            generation,
            interval: timer.interval,
        }
    }

    pub fn stop(&mut self, id: TimerId) {
        self.get_mut(id).stop();
    }

    pub fn expire(&mut self, id: TimerId, generation: u64) -> TimerExpiry {
        self.get_mut(id).expire(generation)
    }

    /// Stops the timer only while `ticket` is still its current start.
    pub fn cancel(&mut self, ticket: &TimerTicket) -> bool {
        let timer = self.get_mut(ticket.id);
        if !timer.running || timer.generation != ticket.generation {
            return false;
        }
        timer.stop();
        true
    }

    /// Stops every timer; pending expiries all become stale.
    pub fn cancel_all(&mut self) {
        self.timers.iter_mut().for_each(NasTimer::stop);
    }

    pub fn running(&self) -> Vec<TimerId> {
        self.timers
            .iter()
            .filter(|t| t.running)
            .map(|t| t.id)
            .collect()
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new(&TimerConfig::default(), &RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_config() {
        let timers = TimerSet::default();
        assert_eq!(timers.get(TimerId::T3510).interval(), Duration::from_secs(15));
        assert_eq!(timers.get(TimerId::T3510).max_retries(), 5);
        assert_eq!(timers.get(TimerId::T3521).max_retries(), 4);
        assert_eq!(timers.get(TimerId::T3502).interval(), Duration::from_secs(720));
        assert_eq!(
            timers.get(TimerId::Non3gppDeregistration).interval(),
            Duration::from_secs(3240)
        );
        assert!(timers.running().is_empty());
        assert!(TimerId::T3521.is_mm());
        assert!(!TimerId::T3582.is_mm());
        assert_eq!(TimerId::Non3gppDeregistration.to_string(), "Non3GPPDeregistration");
        assert_eq!(TimerId::T3580.to_string(), "T3580");
    }

    #[test]
    fn test_retransmit_until_exhausted() {
        let mut timers = TimerSet::default();
        let ticket = timers.start(TimerId::T3521, Some(vec![1, 2, 3]));

        for attempt in 1..=4 {
            assert_eq!(
                timers.expire(TimerId::T3521, ticket.generation),
                TimerExpiry::Retransmit {
                    pdu: vec![1, 2, 3],
                    attempt
                }
            );
            assert!(timers.get(TimerId::T3521).is_running());
        }
        assert_eq!(
            timers.expire(TimerId::T3521, ticket.generation),
            TimerExpiry::Exhausted { attempts: 5 }
        );
        assert!(!timers.get(TimerId::T3521).is_running());
        assert_eq!(timers.expire(TimerId::T3521, ticket.generation), TimerExpiry::Stale);
    }

    #[test]
    fn test_restart_makes_old_expiry_stale() {
        let mut timers = TimerSet::default();
        let first = timers.start(TimerId::T3510, Some(vec![0xAA]));
        let second = timers.start(TimerId::T3510, Some(vec![0xBB]));
        assert_ne!(first.generation, second.generation);

        assert_eq!(timers.expire(TimerId::T3510, first.generation), TimerExpiry::Stale);
        assert_eq!(
            timers.expire(TimerId::T3510, second.generation),
            TimerExpiry::Retransmit {
                pdu: vec![0xBB],
                attempt: 1
            }
        );
    }

    #[test]
    fn test_stop_and_cancel_all() {
        let mut timers = TimerSet::default();
        let t3580 = timers.start(TimerId::T3580, Some(vec![1]));
        let t3582 = timers.start(TimerId::T3582, None);
        assert_eq!(timers.running(), vec![TimerId::T3580, TimerId::T3582]);

        timers.stop(TimerId::T3580);
        assert_eq!(timers.expire(TimerId::T3580, t3580.generation), TimerExpiry::Stale);

        timers.cancel_all();
        assert!(timers.running().is_empty());
        assert_eq!(timers.expire(TimerId::T3582, t3582.generation), TimerExpiry::Stale);
    }

    #[test]
    fn test_cancel_ignores_superseded_ticket() {
        let mut timers = TimerSet::default();
        let first = timers.start(TimerId::T3580, Some(vec![1]));
        let second = timers.start(TimerId::T3580, Some(vec![2]));

        assert!(!timers.cancel(&first));
        assert!(timers.get(TimerId::T3580).is_running());
        assert!(timers.cancel(&second));
        assert!(timers.running().is_empty());
        assert!(!timers.cancel(&second));
    }

    #[test]
    fn test_timer_without_pdu_expires_once() {
        let mut timers = TimerSet::default();
        let ticket = timers.start(TimerId::T3502, None);
        assert_eq!(timers.expire(TimerId::T3502, ticket.generation), TimerExpiry::Expired);
        assert!(!timers.get(TimerId::T3502).is_running());
    }

    #[test]
    fn test_zero_retry_ceiling() {
        let mut timers = TimerSet::default();
        let ticket = timers.start(TimerId::T3540, Some(vec![9]));
        assert_eq!(
            timers.expire(TimerId::T3540, ticket.generation),
            TimerExpiry::Exhausted { attempts: 1 }
        );
    }
}
