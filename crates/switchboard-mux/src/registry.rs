//! Slot table of live sessions.
//!
//! Sessions live in numbered slots. Freed slots are reused lowest-first, so
//! the table never grows past the peak number of concurrent sessions. A slot
//! freed while a scan is running is not handed out again until the scan
//! finishes; this keeps the scan from visiting a newcomer in a recycled slot
//! during the same pass.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use switchboard_core::ConnectionId;

use crate::session::Session;

/// Index of a session slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What [`SessionRegistry::for_each_live`] should do with the visited session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Remove,
}

#[derive(Default)]
pub struct SessionRegistry {
    slots: Vec<Option<Session>>,
    free: BTreeSet<usize>,
    deferred: Vec<usize>,
    scanning: bool,
    live: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session in the lowest free slot.
    pub fn admit(&mut self, session: Session) -> SlotId {
        self.live += 1;
        if let Some(index) = self.free.pop_first() {
            self.slots[index] = Some(session);
            return SlotId(index);
        }
        self.slots.push(Some(session));
        SlotId(self.slots.len() - 1)
    }

    /// Take a session out of its slot.
    pub fn remove(&mut self, slot: SlotId) -> Option<Session> {
        let session = self.slots.get_mut(slot.0)?.take()?;
        self.live -= 1;
        if self.scanning {
            self.deferred.push(slot.0);
        } else {
            let _ = self.free.insert(slot.0);
        }
        Some(session)
    }

    pub fn get(&self, slot: SlotId) -> Option<&Session> {
        self.slots.get(slot.0)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut Session> {
        self.slots.get_mut(slot.0)?.as_mut()
    }

    /// Slot currently holding the connection `id`.
    pub fn slot_of(&self, id: &ConnectionId) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.id() == id))
            .map(SlotId)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total slots ever allocated, occupied or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots in ascending order.
    pub fn live_slots(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| SlotId(index)))
            .collect()
    }

    /// Start a scan and snapshot the slots it should visit.
    pub fn begin_scan(&mut self) -> Vec<SlotId> {
        self.scanning = true;
        self.live_slots()
    }

    /// End the scan, releasing slots freed during it for reuse.
    pub fn finish_scan(&mut self) {
        self.scanning = false;
        self.free.extend(self.deferred.drain(..));
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Visit every live session once, removing those the callback rejects.
    ///
    /// Returns the removed sessions in slot order.
    pub fn for_each_live<F>(&mut self, mut f: F) -> Vec<Session>
    where
        F: FnMut(SlotId, &mut Session) -> Visit,
    {
        let mut removed = Vec::new();
        for slot in self.begin_scan() {
            let visit = match self.get_mut(slot) {
                Some(session) => f(slot, session),
                None => continue,
            };
            if visit == Visit::Remove {
                removed.extend(self.remove(slot));
            }
        }
        self.finish_scan();
        removed
    }

    /// Remove every session, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<(SlotId, Session)> {
        let drained: Vec<(SlotId, Session)> = self
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.take().map(|s| (SlotId(index), s)))
            .collect();
        self.live = 0;
        self.deferred.clear();
        self.free = (0..self.slots.len()).collect();
        drained
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("free", &self.free)
            .field("scanning", &self.scanning)
            .finish()
    }
}
