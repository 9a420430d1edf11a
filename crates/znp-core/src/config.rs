// ── Radio network configuration ──
//
// The immutable settings a controller brings the radio up with. Built by
// callers (usually via `znp-config`) and handed to `Controller::new`;
// core never reads files or environment variables.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

/// Channel bits a 2.4 GHz radio can use (channels 11 through 26).
pub const VALID_CHANNEL_MASK: u32 = 0x07FF_F800;

/// PAN id meaning "let the radio choose".
pub const ANY_PAN_ID: u16 = 0xFFFF;

/// Zigbee logical device type the radio takes on.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceType {
    #[default]
    Coordinator,
    Router,
    EndDevice,
}

impl DeviceType {
    /// Logical type code as the radio expects it.
    pub fn code(self) -> u8 {
        match self {
            Self::Coordinator => 0x00,
            Self::Router => 0x01,
            Self::EndDevice => 0x02,
        }
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x00 => Ok(Self::Coordinator),
            0x01 => Ok(Self::Router),
            0x02 => Ok(Self::EndDevice),
            other => Err(CoreError::validation(format!(
                "device type must be 0 (coordinator), 1 (router) or 2 (end device), got {other}"
            ))),
        }
    }
}

/// How the PAN id for a new network is chosen.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PanIdSelection {
    #[default]
    Random,
    Fixed,
}

/// Network bring-up settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub device_type: DeviceType,
    /// Clear stored network state and form a fresh network on start.
    pub start_new_network: bool,
    /// Bitmask of permitted channels (bit N = channel N).
    pub channel_mask: u32,
    pub baud_rate: u32,
    pub pan_id_selection: PanIdSelection,
    pub pan_id: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Coordinator,
            start_new_network: false,
            channel_mask: 0x800,
            baud_rate: 115_200,
            pan_id_selection: PanIdSelection::Random,
            pan_id: ANY_PAN_ID,
        }
    }
}

impl NetworkConfig {
    /// Build a channel mask from a list of channel numbers.
    pub fn mask_for_channels(channels: &[u8]) -> Result<u32, CoreError> {
        channels.iter().try_fold(0u32, |mask, &ch| {
            if (11..=26).contains(&ch) {
                Ok(mask | (1u32 << ch))
            } else {
                Err(CoreError::validation(format!(
                    "channel {ch} is outside the 2.4 GHz range 11-26"
                )))
            }
        })
    }

    /// Channel numbers enabled in the mask, ascending.
    pub fn channels(&self) -> Vec<u8> {
        (11u8..=26)
            .filter(|ch| self.channel_mask & (1u32 << ch) != 0)
            .collect()
    }

    /// The PAN id actually requested from the radio.
    pub fn effective_pan_id(&self) -> u16 {
        match self.pan_id_selection {
            PanIdSelection::Random => ANY_PAN_ID,
            PanIdSelection::Fixed => self.pan_id,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.channel_mask == 0 {
            return Err(CoreError::validation("channel mask enables no channels"));
        }
        if self.channel_mask & !VALID_CHANNEL_MASK != 0 {
            return Err(CoreError::validation(format!(
                "channel mask {:#010x} enables channels outside 11-26",
                self.channel_mask
            )));
        }
        if self.baud_rate == 0 {
            return Err(CoreError::validation("baud rate must be non-zero"));
        }
        if self.pan_id_selection == PanIdSelection::Fixed && self.pan_id == ANY_PAN_ID {
            return Err(CoreError::validation(
                "fixed PAN id selection needs a PAN id other than 0xFFFF",
            ));
        }
        Ok(())
    }
}
