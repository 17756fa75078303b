//! Discovery filter and driver table.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// USB serial driver families understood by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverKind {
    #[serde(rename = "CdcAcmSerialDriver")]
    CdcAcm,
    #[serde(rename = "FtdiSerialDriver")]
    Ftdi,
    #[serde(rename = "Cp21xxSerialDriver")]
    Cp21xx,
    #[serde(rename = "ProlificSerialDriver")]
    Prolific,
    #[serde(rename = "Ch34xSerialDriver")]
    Ch34x,
}

impl DriverKind {
    /// Every known driver, in match order.
    pub const ALL: [DriverKind; 5] = [
        Self::CdcAcm,
        Self::Ftdi,
        Self::Cp21xx,
        Self::Prolific,
        Self::Ch34x,
    ];

    /// Name used on the command surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CdcAcm => "CdcAcmSerialDriver",
            Self::Ftdi => "FtdiSerialDriver",
            Self::Cp21xx => "Cp21xxSerialDriver",
            Self::Prolific => "ProlificSerialDriver",
            Self::Ch34x => "Ch34xSerialDriver",
        }
    }

    /// Driver the default matcher assigns to a vendor id.
    pub fn for_vendor(vid: u16) -> Self {
        match vid {
            0x0403 => Self::Ftdi,
            0x10C4 => Self::Cp21xx,
            0x067B => Self::Prolific,
            0x1A86 | 0x4348 => Self::Ch34x,
            _ => Self::CdcAcm,
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| BridgeError::UnknownDriver(s.to_string()))
    }
}

/// A USB vendor or product id.
///
/// Accepts either a JSON number or a hexadecimal string, with or without a
/// `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UsbId(pub u16);

impl FromStr for UsbId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u16::from_str_radix(digits, 16)
            .map(UsbId)
            .map_err(|_| BridgeError::invalid(format!("invalid USB id: {s:?}")))
    }
}

impl<'de> Deserialize<'de> for UsbId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => u16::try_from(n)
                .map(UsbId)
                .map_err(|_| serde::de::Error::custom(format!("USB id out of range: {n}"))),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Optional narrowing of the device search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<UsbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<UsbId>,
    /// Driver name, e.g. `FtdiSerialDriver`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

/// How candidate devices are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// First attached USB serial device, driver inferred from the vendor.
    Default,
    /// Exactly this vendor/product pair, bound to the given driver.
    Custom { vid: u16, pid: u16, driver: DriverKind },
}

impl DeviceFilter {
    /// Filter for an exact vendor/product pair.
    pub fn usb(vid: u16, pid: u16) -> Self {
        Self {
            vid: Some(UsbId(vid)),
            pid: Some(UsbId(pid)),
            driver: None,
        }
    }

    /// Set the driver name.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Resolve the filter into a match rule.
    ///
    /// A custom table is only built when both ids are present; its driver
    /// defaults to CDC-ACM and must be a known name.
    pub fn match_rule(&self) -> BridgeResult<MatchRule> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => {
                let driver = match self.driver.as_deref() {
                    Some(name) => name.parse()?,
                    None => DriverKind::CdcAcm,
                };
                Ok(MatchRule::Custom {
                    vid: vid.0,
                    pid: pid.0,
                    driver,
                })
            }
            _ => Ok(MatchRule::Default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_usb_id_number_or_hex() {
        let filter: DeviceFilter =
            serde_json::from_str(r#"{"vid": 9025, "pid": "0043"}"#).unwrap();
        assert_eq!(filter.vid, Some(UsbId(0x2341)));
        assert_eq!(filter.pid, Some(UsbId(0x0043)));

        let prefixed: UsbId = "0x10C4".parse().unwrap();
        assert_eq!(prefixed, UsbId(0x10C4));
    }

    #[test]
    fn test_usb_id_rejects_garbage() {
        assert!(serde_json::from_str::<DeviceFilter>(r#"{"vid": "zz"}"#).is_err());
        assert!(serde_json::from_str::<DeviceFilter>(r#"{"vid": 70000}"#).is_err());
    }

    #[test]
    fn test_match_rule_default_without_both_ids() {
        assert_eq!(
            DeviceFilter::default().match_rule().unwrap(),
            MatchRule::Default
        );
        let only_vid = DeviceFilter {
            vid: Some(UsbId(0x0403)),
            ..Default::default()
        };
        assert_eq!(only_vid.match_rule().unwrap(), MatchRule::Default);
    }

    #[test]
    fn test_match_rule_custom_defaults_to_cdc_acm() {
        let rule = DeviceFilter::usb(0x2341, 0x0043).match_rule().unwrap();
        assert_eq!(
            rule,
            MatchRule::Custom {
                vid: 0x2341,
                pid: 0x0043,
                driver: DriverKind::CdcAcm
            }
        );
    }

    #[test]
    fn test_unknown_driver() {
        let err = DeviceFilter::usb(1, 2)
            .with_driver("MagicSerialDriver")
            .match_rule()
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownDriver(ref name) if name == "MagicSerialDriver"));
    }

    #[test]
    fn test_vendor_table() {
        assert_eq!(DriverKind::for_vendor(0x0403), DriverKind::Ftdi);
        assert_eq!(DriverKind::for_vendor(0x1A86), DriverKind::Ch34x);
        assert_eq!(DriverKind::for_vendor(0x2341), DriverKind::CdcAcm);
        assert_eq!("Cp21xxSerialDriver".parse::<DriverKind>().unwrap(), DriverKind::Cp21xx);
    }
}
