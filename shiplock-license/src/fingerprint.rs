//! Machine fingerprinting for license binding.
//!
//! A fingerprint is the SHA-256 of four fixed slots joined with `|`:
//!
//! ```text
//! hardware_serial | system_instance_id | hostname | primary_mac
//! ```
//!
//! A slot that cannot be read is kept as an empty string rather than
//! dropped, so one missing value never shifts the others into a different
//! position. This trades some entropy for stability: two machines that both
//! lack a serial number differ only by the remaining slots.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Separator placed between fingerprint slots before hashing.
pub const COMPONENT_SEPARATOR: &str = "|";

/// Length of a hex-encoded fingerprint digest.
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Raw identifiers read from the machine, one per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintComponents {
    pub hardware_serial: Option<String>,
    pub system_instance_id: Option<String>,
    pub hostname: Option<String>,
    pub primary_mac: Option<String>,
}

impl FingerprintComponents {
    /// Reads every slot from the current machine. Never fails; unreadable
    /// slots are left as `None`.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            hardware_serial: normalize(get_hardware_serial()),
            system_instance_id: normalize(get_system_instance_id()),
            hostname: normalize(get_hostname()),
            primary_mac: normalize(get_primary_mac()).map(|m| m.to_ascii_lowercase()),
        }
    }

    /// Slot values in their fixed order, with missing slots as `""`.
    #[must_use]
    pub fn slots(&self) -> [&str; 4] {
        [
            self.hardware_serial.as_deref().unwrap_or(""),
            self.system_instance_id.as_deref().unwrap_or(""),
            self.hostname.as_deref().unwrap_or(""),
            self.primary_mac.as_deref().unwrap_or(""),
        ]
    }

    /// True when no slot carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots().iter().all(|s| s.is_empty())
    }
}

/// A hex-encoded SHA-256 machine identity digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineFingerprint(String);

impl MachineFingerprint {
    /// Digests a component set.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::FingerprintUnavailable`] if every slot is empty.
    pub fn from_components(components: &FingerprintComponents) -> LicenseResult<Self> {
        if components.is_empty() {
            return Err(LicenseError::FingerprintUnavailable);
        }
        let combined = components.slots().join(COMPONENT_SEPARATOR);
        let digest = Sha256::digest(combined.as_bytes());
        Ok(Self(hex::encode(digest)))
    }

    /// Parses a fingerprint received from another machine.
    pub fn from_hex(value: &str) -> LicenseResult<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.len() != FINGERPRINT_HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LicenseError::InvalidPayload(format!(
                "machine id must be {FINGERPRINT_HEX_LEN} hex characters"
            )));
        }
        Ok(Self(value))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..16).unwrap_or(&self.0)
    }

    /// Constant-time comparison against a stored machine id.
    #[must_use]
    pub fn matches(&self, machine_id: &str) -> bool {
        bool::from(self.0.as_bytes().ct_eq(machine_id.as_bytes()))
    }
}

impl std::fmt::Display for MachineFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the local machine fingerprint.
pub trait FingerprintProvider: Send + Sync {
    fn compute(&self) -> LicenseResult<MachineFingerprint>;
}

/// Reads the fingerprint of the machine this process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFingerprint;

impl FingerprintProvider for SystemFingerprint {
    fn compute(&self) -> LicenseResult<MachineFingerprint> {
        let components = FingerprintComponents::collect();
        let [serial, instance, host, mac] = components.slots();
        for (slot, value) in [
            ("hardware_serial", serial),
            ("system_instance_id", instance),
            ("hostname", host),
            ("primary_mac", mac),
        ] {
            if value.is_empty() {
                debug!(slot, "fingerprint component unavailable");
            }
        }
        MachineFingerprint::from_components(&components).inspect_err(|_| {
            warn!("no fingerprint component could be read");
        })
    }
}

/// A fingerprint supplied up front: a remote client's machine id at
/// issuance time, or a pinned value in tests.
#[derive(Debug, Clone)]
pub struct StaticFingerprint(pub MachineFingerprint);

impl FingerprintProvider for StaticFingerprint {
    fn compute(&self) -> LicenseResult<MachineFingerprint> {
        Ok(self.0.clone())
    }
}

/// Diagnostic information about the current machine. Not signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Hostname.
    pub hostname: String,
}

impl SystemInfo {
    /// Collects information about the current machine.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            hostname: get_hostname().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn get_hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
}

/// Hardware serial number.
///
/// On x86 Linux the DMI serial is usually readable by root only, so the
/// issuer and the launcher must fingerprint under the same privileges.
fn get_hardware_serial() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let cpu_serial = std::fs::read_to_string("/proc/cpuinfo").ok().and_then(|info| {
            info.lines()
                .find(|l| l.starts_with("Serial"))
                .and_then(|l| l.split(':').nth(1))
                .map(|s| s.trim().to_string())
        });
        cpu_serial
            .filter(|s| !s.chars().all(|c| c == '0'))
            .or_else(|| std::fs::read_to_string("/sys/class/dmi/id/product_serial").ok())
    }

    #[cfg(target_os = "macos")]
    {
        command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"]).and_then(|out| {
            out.lines()
                .find(|l| l.contains("IOPlatformSerialNumber"))
                .and_then(|l| l.split('"').nth(3))
                .map(String::from)
        })
    }

    #[cfg(target_os = "windows")]
    {
        command_output("wmic", &["bios", "get", "serialnumber"])
            .and_then(|out| out.lines().nth(1).map(|l| l.trim().to_string()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}

/// OS installation identifier.
fn get_system_instance_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
    }

    #[cfg(target_os = "macos")]
    {
        command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"]).and_then(|out| {
            out.lines()
                .find(|l| l.contains("IOPlatformUUID"))
                .and_then(|l| l.split('"').nth(3))
                .map(String::from)
        })
    }

    #[cfg(target_os = "windows")]
    {
        command_output(
            "reg",
            &[
                "query",
                r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ],
        )
        .and_then(|out| {
            out.lines()
                .find(|l| l.contains("MachineGuid"))
                .and_then(|l| l.split_whitespace().last())
                .map(String::from)
        })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}

/// MAC address of the first physical interface, by interface name.
fn get_primary_mac() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let mut names: Vec<String> = std::fs::read_dir("/sys/class/net")
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| is_physical_interface(n))
            .collect();
        names.sort();
        names.into_iter().find_map(|name| {
            std::fs::read_to_string(format!("/sys/class/net/{name}/address"))
                .ok()
                .map(|a| a.trim().to_string())
                .filter(|a| is_usable_mac(a))
        })
    }

    #[cfg(target_os = "macos")]
    {
        command_output("ifconfig", &["en0"]).and_then(|out| {
            out.lines()
                .map(str::trim)
                .find(|l| l.starts_with("ether "))
                .and_then(|l| l.split_whitespace().nth(1))
                .map(String::from)
                .filter(|a| is_usable_mac(a))
        })
    }

    #[cfg(target_os = "windows")]
    {
        command_output("getmac", &["/NH"]).and_then(|out| {
            out.lines()
                .filter_map(|l| l.split_whitespace().next())
                .map(|m| m.replace('-', ":"))
                .find(|m| m.len() == 17 && is_usable_mac(m))
        })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn is_physical_interface(name: &str) -> bool {
    const VIRTUAL_PREFIXES: &[&str] = &["lo", "docker", "veth", "br-", "virbr", "vnet", "tun", "tap"];
    !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)) && !name.contains("virtual")
}

fn is_usable_mac(mac: &str) -> bool {
    !mac.is_empty() && mac != "00:00:00:00:00:00"
}
