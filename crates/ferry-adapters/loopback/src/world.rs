//! The simulated device world behind a loopback adapter.

use std::collections::{HashMap, VecDeque};

use ferry_core::{ApplicationHandle, DeviceInfo, DeviceUid};

use crate::config::DeviceConfig;

/// Adapter operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Search,
    Connect,
    Disconnect,
    DisconnectDevice,
    Send,
}

#[derive(Debug)]
struct SimDevice {
    uid: DeviceUid,
    name: String,
    present: bool,
    sessions: Vec<ApplicationHandle>,
}

/// Devices, their open sessions, and pending scripted failures.
#[derive(Debug, Default)]
pub(crate) struct World {
    devices: Vec<SimDevice>,
    faults: HashMap<Operation, VecDeque<String>>,
}

impl World {
    pub fn new(devices: &[DeviceConfig]) -> Self {
        let mut world = Self::default();
        for device in devices {
            world.add_device(device);
        }
        world
    }

    pub fn add_device(&mut self, config: &DeviceConfig) {
        let uid = DeviceUid::new(&config.uid);
        let name = config.display_name().to_string();
        match self.devices.iter_mut().find(|d| d.uid == uid) {
            Some(device) => {
                device.name = name;
                device.present = config.present;
            }
            None => self.devices.push(SimDevice {
                uid,
                name,
                present: config.present,
                sessions: Vec::new(),
            }),
        }
    }

    pub fn fail_next(&mut self, op: Operation, description: String) {
        self.faults.entry(op).or_default().push_back(description);
    }

    fn fault(&mut self, op: Operation) -> Result<(), String> {
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(description) => Err(description),
            None => Ok(()),
        }
    }

    fn reachable(&mut self, uid: &DeviceUid) -> Result<&mut SimDevice, String> {
        self.devices
            .iter_mut()
            .find(|d| d.present && &d.uid == uid)
            .ok_or_else(|| format!("device {uid} is not reachable"))
    }

    pub fn search(&mut self) -> Result<Vec<DeviceInfo>, String> {
        self.fault(Operation::Search)?;
        Ok(self
            .devices
            .iter()
            .filter(|d| d.present)
            .map(|d| DeviceInfo::new(d.uid.clone(), d.name.clone()))
            .collect())
    }

    pub fn connect(&mut self, uid: &DeviceUid, app: ApplicationHandle) -> Result<(), String> {
        self.fault(Operation::Connect)?;
        self.open(uid, app)
    }

    /// Opens a session without consulting scripted faults.
    pub fn open(&mut self, uid: &DeviceUid, app: ApplicationHandle) -> Result<(), String> {
        let device = self.reachable(uid)?;
        if device.sessions.contains(&app) {
            return Err(format!("application {app} is already connected"));
        }
        device.sessions.push(app);
        Ok(())
    }

    pub fn disconnect(&mut self, uid: &DeviceUid, app: ApplicationHandle) -> Result<(), String> {
        self.fault(Operation::Disconnect)?;
        if self.close(uid, app) {
            Ok(())
        } else {
            Err(format!("application {app} is not connected"))
        }
    }

    pub fn disconnect_device(&mut self, uid: &DeviceUid) -> Result<(), String> {
        self.fault(Operation::DisconnectDevice)?;
        self.reachable(uid)?.sessions.clear();
        Ok(())
    }

    pub fn send(&mut self, uid: &DeviceUid, app: ApplicationHandle) -> Result<(), String> {
        self.fault(Operation::Send)?;
        if self.reachable(uid)?.sessions.contains(&app) {
            Ok(())
        } else {
            Err(format!("application {app} is not connected"))
        }
    }

    /// Closes a session. Returns false if it was not open.
    pub fn close(&mut self, uid: &DeviceUid, app: ApplicationHandle) -> bool {
        let Some(device) = self.devices.iter_mut().find(|d| &d.uid == uid) else {
            return false;
        };
        let before = device.sessions.len();
        device.sessions.retain(|a| *a != app);
        device.sessions.len() != before
    }

    /// Takes a device out of range. Returns false if it already was.
    pub fn vanish(&mut self, uid: &DeviceUid) -> bool {
        match self.devices.iter_mut().find(|d| d.present && &d.uid == uid) {
            Some(device) => {
                device.present = false;
                device.sessions.clear();
                true
            }
            None => false,
        }
    }

    pub fn sessions(&self, uid: &DeviceUid) -> Vec<ApplicationHandle> {
        self.devices
            .iter()
            .find(|d| &d.uid == uid)
            .map(|d| d.sessions.clone())
            .unwrap_or_default()
    }
}
