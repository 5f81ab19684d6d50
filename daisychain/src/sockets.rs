//! Per-device command sockets.
//!
//! A VISCA device has two command buffers ("sockets"), numbered 1 and 2. A
//! command occupies a socket from its ACK (`z0 4s ff`) until its completion
//! (`z0 5s ff`) or error (`z0 6s ee ff`).
use crate::{Error, Result};
use std::{collections::BTreeMap, time::Instant};

pub const SOCKETS_PER_DEVICE: usize = 2;

pub fn is_valid_socket(socket: u8) -> bool {
    (1..=SOCKETS_PER_DEVICE as u8).contains(&socket)
}

struct Slot<T> {
    deadline: Instant,
    entry: T,
}

/// In-flight commands for every device on the bus.
///
/// This is owned by a single task, so each check-then-update is atomic.
pub struct SocketTable<T> {
    devices: BTreeMap<u8, [Option<Slot<T>>; SOCKETS_PER_DEVICE]>,
}

impl<T> Default for SocketTable<T> {
    fn default() -> Self {
        Self {
            devices: BTreeMap::new(),
        }
    }
}

impl<T> SocketTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(socket: u8) -> Result<usize> {
        if is_valid_socket(socket) {
            Ok(usize::from(socket - 1))
        } else {
            Err(Error::MalformedPacket(format!("socket {socket} out of range")))
        }
    }

    /// Records `entry` as running in `socket` of `device` until `deadline`.
    ///
    /// Returns any entry which previously occupied the socket.
    pub fn occupy(&mut self, device: u8, socket: u8, deadline: Instant, entry: T) -> Result<Option<T>> {
        let i = Self::index(socket)?;
        let slots = self.devices.entry(device).or_insert_with(|| [None, None]);
        Ok(slots[i]
            .replace(Slot { deadline, entry })
            .map(|s| s.entry))
    }

    /// Frees `socket` of `device`, returning its entry.
    pub fn take(&mut self, device: u8, socket: u8) -> Option<T> {
        let i = Self::index(socket).ok()?;
        self.devices.get_mut(&device)?[i].take().map(|s| s.entry)
    }

    pub fn free_count(&self, device: u8) -> usize {
        self.devices.get(&device).map_or(SOCKETS_PER_DEVICE, |slots| {
            slots.iter().filter(|s| s.is_none()).count()
        })
    }

    pub fn is_full(&self, device: u8) -> bool {
        self.free_count(device) == 0
    }

    /// Frees every socket whose deadline is before `now`.
    ///
    /// Returns `(device, socket, entry)` for each.
    pub fn expire(&mut self, now: Instant) -> Vec<(u8, u8, T)> {
        let mut expired = Vec::new();
        for (&device, slots) in self.devices.iter_mut() {
            for (i, slot) in slots.iter_mut().enumerate() {
                if slot.as_ref().is_some_and(|s| s.deadline <= now) {
                    if let Some(s) = slot.take() {
                        expired.push((device, i as u8 + 1, s.entry));
                    }
                }
            }
        }
        expired
    }

    /// Frees all sockets of `device`.
    pub fn clear_device(&mut self, device: u8) -> Vec<T> {
        self.devices
            .remove(&device)
            .into_iter()
            .flatten()
            .flatten()
            .map(|s| s.entry)
            .collect()
    }

    /// Frees every socket on the bus.
    pub fn clear_all(&mut self) -> Vec<T> {
        std::mem::take(&mut self.devices)
            .into_values()
            .flatten()
            .flatten()
            .map(|s| s.entry)
            .collect()
    }
}
