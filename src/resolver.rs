//! Device resolution: mapping stable hardware identity to the driver's
//! small-integer device ID space.
//!
//! Device IDs are assigned by the driver per physical device and are only
//! stable until the next reboot or driver reload, so callers subscribe by
//! hardware identity and this module resolves it to the current ID. None of
//! this runs on the dispatch hot path; it is queried at subscription time.

use crate::driver::FilterDriver;
use crate::error::{Error, Result};
use crate::stroke::{self, MAX_DEVICES};

/// Which half of the device ID space to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Device IDs 1-10.
    Keyboard,
    /// Device IDs 11-20.
    Mouse,
}

impl DeviceClass {
    fn contains(self, device: i32) -> bool {
        match self {
            DeviceClass::Keyboard => stroke::is_keyboard(device),
            DeviceClass::Mouse => stroke::is_mouse(device),
        }
    }
}

/// A snapshot of one enumerated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Driver-assigned device ID.
    pub id: i32,
    /// Raw hardware identity string as reported by the driver.
    pub hardware_id: String,
    /// Vendor ID parsed from the hardware string, when present.
    pub vid: Option<u16>,
    /// Product ID parsed from the hardware string, when present.
    pub pid: Option<u16>,
}

impl DeviceInfo {
    /// True if the device ID is in the keyboard range.
    pub fn is_keyboard(&self) -> bool {
        stroke::is_keyboard(self.id)
    }

    /// True if the device ID is in the mouse range.
    pub fn is_mouse(&self) -> bool {
        stroke::is_mouse(self.id)
    }
}

/// Pull a 4-digit hex field like `VID_046D` out of a hardware ID string,
/// case-insensitively.
fn parse_hex_field(hardware_id: &str, tag: &str) -> Option<u16> {
    let upper = hardware_id.to_ascii_uppercase();
    let start = upper.find(tag)? + tag.len();
    let digits = upper.get(start..start + 4)?;
    u16::from_str_radix(digits, 16).ok()
}

/// Parse the vendor and product IDs out of a hardware identity string.
pub fn parse_vid_pid(hardware_id: &str) -> (Option<u16>, Option<u16>) {
    (
        parse_hex_field(hardware_id, "VID_"),
        parse_hex_field(hardware_id, "PID_"),
    )
}

/// Enumerate every device the driver currently backs with hardware.
pub fn devices<D: FilterDriver>(driver: &D) -> Result<Vec<DeviceInfo>> {
    let mut found = Vec::new();
    for id in 1..=MAX_DEVICES {
        let Some(hardware_id) = driver.hardware_id(id)? else {
            continue;
        };
        if hardware_id.is_empty() {
            continue;
        }
        let (vid, pid) = parse_vid_pid(&hardware_id);
        found.push(DeviceInfo {
            id,
            hardware_id,
            vid,
            pid,
        });
    }
    Ok(found)
}

/// Resolve a device by vendor/product ID within one device class.
///
/// `instance` is 1-based and disambiguates multiple identical devices.
pub fn find_device<D: FilterDriver>(
    driver: &D,
    class: DeviceClass,
    vid: u16,
    pid: u16,
    instance: usize,
) -> Result<i32> {
    if instance == 0 {
        return Err(Error::DeviceNotFound(format!(
            "instance is 1-based, got 0 (VID_{vid:04X} PID_{pid:04X})"
        )));
    }
    let mut seen = 0;
    for info in devices(driver)? {
        if class.contains(info.id) && info.vid == Some(vid) && info.pid == Some(pid) {
            seen += 1;
            if seen == instance {
                return Ok(info.id);
            }
        }
    }
    Err(Error::DeviceNotFound(format!(
        "VID_{vid:04X} PID_{pid:04X} instance {instance}"
    )))
}

/// Resolve a device whose hardware identity string contains `fragment`,
/// within one device class. `instance` is 1-based.
pub fn find_device_by_hardware<D: FilterDriver>(
    driver: &D,
    class: DeviceClass,
    fragment: &str,
    instance: usize,
) -> Result<i32> {
    if instance == 0 {
        return Err(Error::DeviceNotFound(format!(
            "instance is 1-based, got 0 ({fragment:?})"
        )));
    }
    let mut seen = 0;
    for info in devices(driver)? {
        if class.contains(info.id) && info.hardware_id.contains(fragment) {
            seen += 1;
            if seen == instance {
                return Ok(info.id);
            }
        }
    }
    Err(Error::DeviceNotFound(format!(
        "{fragment:?} instance {instance}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;

    #[test]
    fn test_parse_vid_pid() {
        let (vid, pid) = parse_vid_pid(r"HID\VID_046D&PID_C52B&REV_1201");
        assert_eq!(vid, Some(0x046D));
        assert_eq!(pid, Some(0xC52B));

        let (vid, pid) = parse_vid_pid(r"hid\vid_1532&pid_0084");
        assert_eq!(vid, Some(0x1532));
        assert_eq!(pid, Some(0x0084));

        let (vid, pid) = parse_vid_pid(r"ACPI\PNP0303");
        assert_eq!(vid, None);
        assert_eq!(pid, None);
    }

    #[test]
    fn test_enumeration_skips_absent_devices() {
        let driver = MockDriver::new();
        driver.set_hardware(1, r"ACPI\PNP0303");
        driver.set_hardware(11, r"HID\VID_046D&PID_C52B");

        let devices = devices(&driver).unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices[0].is_keyboard());
        assert!(devices[1].is_mouse());
        assert_eq!(devices[1].vid, Some(0x046D));
    }

    #[test]
    fn test_find_device_with_instance_disambiguation() {
        let driver = MockDriver::new();
        driver.set_hardware(11, r"HID\VID_046D&PID_C52B");
        driver.set_hardware(12, r"HID\VID_046D&PID_C52B");

        let first = find_device(&driver, DeviceClass::Mouse, 0x046D, 0xC52B, 1).unwrap();
        let second = find_device(&driver, DeviceClass::Mouse, 0x046D, 0xC52B, 2).unwrap();
        assert_eq!((first, second), (11, 12));

        assert!(find_device(&driver, DeviceClass::Mouse, 0x046D, 0xC52B, 3).is_err());
        // Same identity searched in the keyboard range misses.
        assert!(find_device(&driver, DeviceClass::Keyboard, 0x046D, 0xC52B, 1).is_err());
    }

    #[test]
    fn test_find_device_by_hardware_fragment() {
        let driver = MockDriver::new();
        driver.set_hardware(1, r"ACPI\PNP0303\4&2F94427B&0");

        let id = find_device_by_hardware(&driver, DeviceClass::Keyboard, "PNP0303", 1).unwrap();
        assert_eq!(id, 1);
        assert!(find_device_by_hardware(&driver, DeviceClass::Mouse, "PNP0303", 1).is_err());
    }
}
