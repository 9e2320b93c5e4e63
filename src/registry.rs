//! Shared registry of known LAN hosts and their interception state.
//!
//! The registry is read and mutated from several contexts at once: the
//! redirect loop consumes byte budgets, a sniffer session reads addresses,
//! and the control surface flips flags and caps. Entries are therefore
//! `Arc`-shared with per-device synchronization instead of one table-wide
//! lock held across the hot path.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use pnet::util::MacAddr;

/// Byte budget for one traffic direction of one device.
///
/// A cap of zero means unlimited. The cap check and the increment happen
/// under the same lock, so two loops racing on the same device cannot slip
/// a frame past an exhausted cap.
#[derive(Debug, Default)]
struct TrafficMeter {
    cap: u64,
    used: u64,
}

impl TrafficMeter {
    /// Account `len` bytes if the budget allows another frame.
    ///
    /// A frame is permitted while `used < cap`; the frame that crosses the
    /// cap is still forwarded in full, after which the direction halts until
    /// an external reset.
    fn try_consume(&mut self, len: u64) -> bool {
        if self.cap == 0 || self.used < self.cap {
            self.used += len;
            true
        } else {
            false
        }
    }
}

/// One known LAN host.
///
/// The IP is the immutable key; the MAC may be refreshed on rediscovery.
pub struct Device {
    ip: Ipv4Addr,
    mac: RwLock<MacAddr>,
    blocked: AtomicBool,
    redirected: AtomicBool,
    upload: Mutex<TrafficMeter>,
    download: Mutex<TrafficMeter>,
}

impl Device {
    fn new(ip: Ipv4Addr, mac: MacAddr) -> Self {
        Self {
            ip,
            mac: RwLock::new(mac),
            blocked: AtomicBool::new(false),
            redirected: AtomicBool::new(false),
            upload: Mutex::new(TrafficMeter::default()),
            download: Mutex::new(TrafficMeter::default()),
        }
    }

    pub const fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn mac(&self) -> MacAddr {
        *self.mac.read()
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    pub fn is_redirected(&self) -> bool {
        self.redirected.load(Ordering::SeqCst)
    }

    /// Account `len` upload bytes; returns whether the frame may be forwarded.
    pub fn consume_upload(&self, len: u64) -> bool {
        self.upload.lock().try_consume(len)
    }

    /// Account `len` download bytes; returns whether the frame may be forwarded.
    pub fn consume_download(&self, len: u64) -> bool {
        self.download.lock().try_consume(len)
    }
}

/// Read-only view of a device for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub blocked: bool,
    pub redirected: bool,
    pub upload_cap: u64,
    pub download_cap: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Mapping from network address to device, shared between sessions and the
/// control surface.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    entries: Arc<RwLock<HashMap<Ipv4Addr, Arc<Device>>>>,
}

impl DeviceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device, or refresh the MAC of an existing entry.
    pub fn register(&self, ip: Ipv4Addr, mac: MacAddr) -> Arc<Device> {
        let mut entries = self.entries.write();
        if let Some(device) = entries.get(&ip) {
            *device.mac.write() = mac;
            return Arc::clone(device);
        }

        let device = Arc::new(Device::new(ip, mac));
        entries.insert(ip, Arc::clone(&device));
        device
    }

    /// Look up a device by network address.
    pub fn get(&self, ip: &Ipv4Addr) -> Option<Arc<Device>> {
        self.entries.read().get(ip).cloned()
    }

    /// Look up a device by hardware address.
    ///
    /// Used on the forward path to match a captured frame's source against
    /// registered devices. A miss means the traffic is simply not ours to
    /// manage.
    pub fn find_by_mac(&self, mac: MacAddr) -> Option<Arc<Device>> {
        self.entries
            .read()
            .values()
            .find(|device| device.mac() == mac)
            .cloned()
    }

    /// Flag or unflag a device for continuous ARP-spoof pressure.
    /// Returns false if the device is unknown.
    pub fn set_blocked(&self, ip: Ipv4Addr, blocked: bool) -> bool {
        self.with_device(ip, |device| {
            device.blocked.store(blocked, Ordering::SeqCst);
        })
    }

    /// Flag or unflag a device for traffic redirection through this engine.
    /// Returns false if the device is unknown.
    pub fn set_redirected(&self, ip: Ipv4Addr, redirected: bool) -> bool {
        self.with_device(ip, |device| {
            device.redirected.store(redirected, Ordering::SeqCst);
        })
    }

    /// Set the per-direction byte ceilings for a device. Zero means
    /// unlimited. Returns false if the device is unknown.
    pub fn set_caps(&self, ip: Ipv4Addr, upload_cap: u64, download_cap: u64) -> bool {
        self.with_device(ip, |device| {
            device.upload.lock().cap = upload_cap;
            device.download.lock().cap = download_cap;
        })
    }

    /// Clear both byte counters of a device, re-opening capped directions.
    /// Returns false if the device is unknown.
    pub fn reset_counters(&self, ip: Ipv4Addr) -> bool {
        self.with_device(ip, |device| {
            device.upload.lock().used = 0;
            device.download.lock().used = 0;
        })
    }

    /// Devices currently flagged for spoofing, for one scheduler pass.
    pub fn blocked(&self) -> Vec<Arc<Device>> {
        self.entries
            .read()
            .values()
            .filter(|device| device.is_blocked())
            .cloned()
            .collect()
    }

    /// Read-only snapshot of every entry for display.
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.entries
            .read()
            .values()
            .map(|device| {
                let upload = device.upload.lock();
                let download = device.download.lock();
                DeviceSnapshot {
                    ip: device.ip,
                    mac: device.mac(),
                    blocked: device.is_blocked(),
                    redirected: device.is_redirected(),
                    upload_cap: upload.cap,
                    download_cap: download.cap,
                    bytes_sent: upload.used,
                    bytes_received: download.used,
                }
            })
            .collect()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn with_device(&self, ip: Ipv4Addr, apply: impl FnOnce(&Device)) -> bool {
        match self.entries.read().get(&ip) {
            Some(device) => {
                apply(device);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);
    const MAC: MacAddr = MacAddr(0x11, 0x22, 0x33, 0x44, 0x55, 0x66);

    #[test]
    fn should_register_and_look_up_devices() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        registry.register(IP, MAC);
        assert_eq!(registry.len(), 1);

        let by_ip = registry.get(&IP).unwrap();
        assert_eq!(by_ip.ip(), IP);
        assert_eq!(by_ip.mac(), MAC);

        let by_mac = registry.find_by_mac(MAC).unwrap();
        assert_eq!(by_mac.ip(), IP);

        assert!(registry.get(&Ipv4Addr::new(10, 0, 0, 1)).is_none());
        assert!(registry.find_by_mac(MacAddr::zero()).is_none());
    }

    #[test]
    fn should_refresh_mac_on_rediscovery() {
        let registry = DeviceRegistry::new();
        registry.register(IP, MAC);

        let new_mac = MacAddr(0x66, 0x55, 0x44, 0x33, 0x22, 0x11);
        registry.register(IP, new_mac);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&IP).unwrap().mac(), new_mac);
        assert!(registry.find_by_mac(MAC).is_none());
        assert!(registry.find_by_mac(new_mac).is_some());
    }

    #[test]
    fn should_treat_zero_cap_as_unlimited() {
        let registry = DeviceRegistry::new();
        let device = registry.register(IP, MAC);

        for _ in 0..100 {
            assert!(device.consume_upload(1500));
        }

        let snapshot = &registry.snapshot()[0];
        assert_eq!(snapshot.bytes_sent, 150_000);
    }

    #[test]
    fn should_halt_direction_once_cap_is_reached() {
        let registry = DeviceRegistry::new();
        let device = registry.register(IP, MAC);
        registry.set_caps(IP, 50, 0);

        // used < cap permits the frame, even when it overshoots the cap.
        assert!(device.consume_upload(60));
        assert!(!device.consume_upload(10));
        assert!(!device.consume_upload(1));

        let snapshot = &registry.snapshot()[0];
        assert_eq!(snapshot.bytes_sent, 60);

        // Download direction is budgeted independently.
        assert!(device.consume_download(10));
    }

    #[test]
    fn should_resume_forwarding_after_counter_reset() {
        let registry = DeviceRegistry::new();
        let device = registry.register(IP, MAC);
        registry.set_caps(IP, 50, 50);

        assert!(device.consume_upload(60));
        assert!(!device.consume_upload(10));

        assert!(registry.reset_counters(IP));
        assert!(device.consume_upload(10));

        let snapshot = &registry.snapshot()[0];
        assert_eq!(snapshot.bytes_sent, 10);
    }

    #[test]
    fn should_serialize_cap_checks_across_threads() {
        // Two loops racing on the same direction must not slip frames past
        // the cap: check and increment share one critical section.
        let registry = DeviceRegistry::new();
        let device = registry.register(IP, MAC);
        registry.set_caps(IP, 500, 0);

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let device = Arc::clone(&device);
                std::thread::spawn(move || {
                    let mut forwarded = 0u64;
                    for _ in 0..1000 {
                        if device.consume_upload(1) {
                            forwarded += 1;
                        }
                    }
                    forwarded
                })
            })
            .collect();

        let forwarded: u64 = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(forwarded, 500);
        assert_eq!(registry.snapshot()[0].bytes_sent, 500);
    }

    #[test]
    fn should_report_unknown_devices_on_control_surface() {
        let registry = DeviceRegistry::new();
        let unknown = Ipv4Addr::new(10, 0, 0, 1);

        assert!(!registry.set_blocked(unknown, true));
        assert!(!registry.set_redirected(unknown, true));
        assert!(!registry.set_caps(unknown, 1, 1));
        assert!(!registry.reset_counters(unknown));
    }

    #[test]
    fn should_list_only_blocked_devices_for_the_scheduler() {
        let registry = DeviceRegistry::new();
        registry.register(IP, MAC);
        registry.register(
            Ipv4Addr::new(192, 168, 1, 51),
            MacAddr(0x66, 0x55, 0x44, 0x33, 0x22, 0x11),
        );

        assert!(registry.blocked().is_empty());

        registry.set_blocked(IP, true);
        let blocked = registry.blocked();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].ip(), IP);

        registry.set_blocked(IP, false);
        assert!(registry.blocked().is_empty());
    }

    #[test]
    fn should_expose_flags_and_caps_in_snapshots() {
        let registry = DeviceRegistry::new();
        registry.register(IP, MAC);
        registry.set_blocked(IP, true);
        registry.set_redirected(IP, true);
        registry.set_caps(IP, 1024, 2048);

        let snapshot = &registry.snapshot()[0];
        assert!(snapshot.blocked);
        assert!(snapshot.redirected);
        assert_eq!(snapshot.upload_cap, 1024);
        assert_eq!(snapshot.download_cap, 2048);
        assert_eq!(snapshot.bytes_sent, 0);
        assert_eq!(snapshot.bytes_received, 0);
    }
}
