use crate::protocol::op::interface::CameraInfo;
use std::collections::BTreeMap;

bitflags! {
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    pub struct StateUpdate: u32 {
        /// The bus was (re-)addressed, or addressing failed.
        const DEVICE_COUNT   = 1;
        /// A device's [CameraInfo] was updated.
        const CAMERA_INFO    = 1 << 1;
        /// A device reported a change in the chain; the bus needs
        /// re-addressing.
        const NETWORK_CHANGE = 1 << 2;
        /// A packet was dropped because nothing was waiting for it.
        const UNSOLICITED    = 1 << 3;
    }
}

/// A single camera on the bus.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Device {
    pub address: u8,
    /// Set after a [device info][crate::protocol::op::interface::device_info]
    /// inquiry.
    pub info: Option<CameraInfo>,
}

/// [BusState] stores what is known about the bus from
/// [ViscaController][crate::ViscaController] events.
#[derive(Debug, Default, Clone)]
pub struct BusState {
    /// Number of devices found by the last addressing, or [None] if the bus
    /// is not addressed.
    pub device_count: Option<u8>,
    /// Devices by address.
    pub devices: BTreeMap<u8, Device>,
    /// Total number of dropped unsolicited packets.
    pub unsolicited_count: usize,
}

impl BusState {
    pub fn is_addressed(&self) -> bool {
        self.device_count.is_some()
    }

    pub fn device(&self, address: u8) -> Option<&Device> {
        self.devices.get(&address)
    }

    /// Records the result of addressing the bus, discarding all previous
    /// devices.
    pub(crate) fn set_device_count(&mut self, count: Option<u8>) -> StateUpdate {
        self.device_count = count;
        self.devices = (1..=count.unwrap_or(0))
            .map(|address| {
                (
                    address,
                    Device {
                        address,
                        info: None,
                    },
                )
            })
            .collect();
        StateUpdate::DEVICE_COUNT
    }

    pub(crate) fn set_camera_info(&mut self, address: u8, info: CameraInfo) -> StateUpdate {
        match self.devices.get_mut(&address) {
            Some(d) if d.info != Some(info) => {
                d.info = Some(info);
                StateUpdate::CAMERA_INFO
            }
            _ => StateUpdate::empty(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn addressing() {
        let mut s = BusState::default();
        assert!(!s.is_addressed());

        assert_eq!(StateUpdate::DEVICE_COUNT, s.set_device_count(Some(3)));
        assert!(s.is_addressed());
        assert_eq!(vec![1, 2, 3], s.devices.keys().copied().collect::<Vec<_>>());

        let info = CameraInfo {
            vendor: 0x20,
            model: 0x402,
            rom_version: 0x110,
            socket_count: 2,
        };
        assert_eq!(StateUpdate::CAMERA_INFO, s.set_camera_info(2, info));
        assert_eq!(StateUpdate::empty(), s.set_camera_info(2, info));
        assert_eq!(StateUpdate::empty(), s.set_camera_info(4, info));
        assert_eq!(Some(info), s.device(2).and_then(|d| d.info));

        s.set_device_count(None);
        assert!(!s.is_addressed());
        assert!(s.devices.is_empty());
    }
}
