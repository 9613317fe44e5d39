//! Attribute identifiers, advertisement and device information
//!
//! Both sides are built against the same constants; nothing here is
//! negotiated at runtime.

use std::time::Duration;

use uuid::Uuid;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Identifier of a service or characteristic
///
/// Short 16/32-bit identifiers are expanded onto the Bluetooth base UUID so
/// every attribute compares as a full 128-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(Uuid);

impl AttributeId {
    pub const fn from_u32(short: u32) -> Self {
        Self(Uuid::from_u128(((short as u128) << 96) | BLUETOOTH_BASE_UUID))
    }

    pub const fn from_u16(short: u16) -> Self {
        Self::from_u32(short as u32)
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// The 32-bit alias, if this id sits on the base UUID
    pub fn short(&self) -> Option<u32> {
        let value = self.0.as_u128();
        if value & ((1u128 << 96) - 1) == BLUETOOTH_BASE_UUID {
            Some((value >> 96) as u32)
        } else {
            None
        }
    }
}

impl std::fmt::Display for AttributeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.short() {
            Some(short) => write!(f, "{:#010x}", short),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Primary telemetry service
pub const SERVICE_ID: AttributeId = AttributeId::from_u32(0xDEAD_BEEF);

/// Telemetry characteristic (read, notify)
pub const TELEMETRY_ID: AttributeId = AttributeId::from_u32(0xCAFE_BABE);

/// Pairing secret characteristic (write, write without response)
pub const AUTH_ID: AttributeId = AttributeId::from_u32(0xFEFE_FEFE);

/// Reserved for challenge values
pub const NONCE_ID: AttributeId = AttributeId::from_u32(0xF00D_BABE);

/// Standard Device Information service
pub const DEVICE_INFORMATION_ID: AttributeId = AttributeId::from_u16(0x180A);

/// Standard Manufacturer Name String characteristic
pub const MANUFACTURER_NAME_ID: AttributeId = AttributeId::from_u16(0x2A29);

/// Standard Firmware Revision String characteristic
pub const FIRMWARE_REVISION_ID: AttributeId = AttributeId::from_u16(0x2A26);

/// Advertised local name
pub const SERVICE_NAME: &str = "Smart Flask";

/// Reported firmware revision
pub const FIRMWARE_VERSION: &str = "0.1";

/// Vendor identifier carried in the manufacturer data
pub const COMPANY_ID: u16 = 0xC001;

/// Largest pairing secret the auth characteristic accepts
pub const AUTH_SECRET_MAX_LEN: usize = 32;

/// Periodic broadcast used by the companion to find the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: String,
    pub company_id: u16,
    pub service_ids: Vec<AttributeId>,
    pub interval: Duration,
}

impl Default for Advertisement {
    fn default() -> Self {
        Self {
            local_name: SERVICE_NAME.to_string(),
            company_id: COMPANY_ID,
            service_ids: vec![SERVICE_ID, DEVICE_INFORMATION_ID],
            interval: Duration::from_millis(1250),
        }
    }
}

impl Advertisement {
    /// Check a scan result against this advertisement
    ///
    /// Both the local name and the vendor identifier must match; the name
    /// alone is not unique among nearby devices.
    pub fn matches<I>(&self, local_name: Option<&str>, company_ids: I) -> bool
    where
        I: IntoIterator<Item = u16>,
    {
        local_name == Some(self.local_name.as_str())
            && company_ids.into_iter().any(|id| id == self.company_id)
    }
}

/// Read-only device identification attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer_name: String,
    pub firmware_revision: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            manufacturer_name: SERVICE_NAME.to_string(),
            firmware_revision: FIRMWARE_VERSION.to_string(),
        }
    }
}

impl DeviceInfo {
    /// Value of a device information characteristic
    pub fn read(&self, id: AttributeId) -> Option<&[u8]> {
        if id == MANUFACTURER_NAME_ID {
            Some(self.manufacturer_name.as_bytes())
        } else if id == FIRMWARE_REVISION_ID {
            Some(self.firmware_revision.as_bytes())
        } else {
            None
        }
    }
}
