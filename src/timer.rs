use smallvec::SmallVec;

use crate::error::WtpError;

#[derive(Debug, Clone)]
struct TimerEntry<T> {
    trigger_tick: u64,
    token: T,
}

/// Tick-driven one-shot timers.
///
/// Each armed timer carries a caller-chosen token; `tick` advances the time
/// base by one unit and hands back the tokens whose trigger tick has been
/// reached, in trigger order (insertion order for equal ticks). The caller
/// dispatches whatever work the token stands for and may re-arm from there.
/// A token can be armed at most once at a time.
#[derive(Debug, Clone)]
pub struct TimerWheel<T> {
    now: u64,
    capacity: usize,
    entries: Vec<TimerEntry<T>>,
}

impl<T: PartialEq + Copy> TimerWheel<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            now: 0,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_armed(&self, token: &T) -> bool {
        self.entries.iter().any(|e| e.token == *token)
    }

    /// Arms `token` to fire `delta` ticks from now.
    pub fn set_timeout(&mut self, token: T, delta: u16) -> Result<(), WtpError> {
        if self.is_armed(&token) {
            return Err(WtpError::Already);
        }
        if self.entries.len() >= self.capacity {
            return Err(WtpError::NoMemory);
        }
        let trigger_tick = self.now + u64::from(delta);
        let at = self
            .entries
            .iter()
            .position(|e| e.trigger_tick > trigger_tick)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, TimerEntry { trigger_tick, token });
        Ok(())
    }

    /// Disarms `token`. Clearing an unarmed timer is fine.
    pub fn clear_timeout(&mut self, token: &T) {
        self.entries.retain(|e| e.token != *token);
    }

    /// Advances the time base by one tick and drains every due timer.
    pub fn tick(&mut self) -> SmallVec<[T; 4]> {
        self.now += 1;
        let mut expired = SmallVec::new();
        while let Some(entry) = self.entries.first() {
            if entry.trigger_tick > self.now {
                break;
            }
            expired.push(self.entries.remove(0).token);
        }
        expired
    }
}
