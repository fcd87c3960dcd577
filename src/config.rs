//! Configuration for the local SETTINGS frame and the frame parser.

use crate::protocol::settings::{SettingsFrame, SETTINGS_GREASE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Settings this endpoint announces to its peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// SETTINGS_MAX_FIELD_SECTION_SIZE, omitted when `None`
    pub max_field_section_size: Option<u64>,

    /// Announce HTTP Datagram support
    pub enable_datagrams: bool,

    /// Announce Extended CONNECT support
    pub enable_extended_connect: bool,

    /// Add a random reserved setting to every SETTINGS frame sent
    pub send_grease: bool,

    /// Extra settings sent verbatim, e.g. QPACK limits
    pub additional: BTreeMap<u64, u64>,

    /// Wire order of setting ids; see [`SettingsFrame::append_with_order`]
    pub order: Option<Vec<u64>>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_field_section_size: None,
            enable_datagrams: false,
            enable_extended_connect: false,
            send_grease: true,
            additional: BTreeMap::new(),
            order: None,
        }
    }
}

impl SettingsConfig {
    /// Create a new settings configuration builder
    pub fn builder() -> SettingsConfigBuilder {
        SettingsConfigBuilder::default()
    }

    /// Build the SETTINGS frame to send.
    pub fn to_frame(&self) -> SettingsFrame {
        let mut other: HashMap<u64, u64> =
            self.additional.iter().map(|(&id, &value)| (id, value)).collect();
        if self.send_grease {
            other.insert(SETTINGS_GREASE, 0);
        }
        SettingsFrame {
            max_field_section_size: self.max_field_section_size,
            datagram: self.enable_datagrams,
            extended_connect: self.enable_extended_connect,
            other,
            order: self.order.clone(),
        }
    }
}

/// Limits applied by [`FrameParser`](crate::protocol::FrameParser).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Largest SETTINGS payload accepted, in bytes
    pub max_settings_frame_size: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_settings_frame_size: 8 * 1024,
        }
    }
}

/// Builder for settings configuration.
#[derive(Debug, Default)]
pub struct SettingsConfigBuilder {
    config: SettingsConfig,
}

impl SettingsConfigBuilder {
    /// Set maximum field section size
    pub fn max_field_section_size(mut self, size: u64) -> Self {
        self.config.max_field_section_size = Some(size);
        self
    }

    /// Enable or disable HTTP Datagrams
    pub fn enable_datagrams(mut self, enable: bool) -> Self {
        self.config.enable_datagrams = enable;
        self
    }

    /// Enable or disable Extended CONNECT
    pub fn enable_extended_connect(mut self, enable: bool) -> Self {
        self.config.enable_extended_connect = enable;
        self
    }

    /// Enable or disable the random reserved setting
    pub fn send_grease(mut self, enable: bool) -> Self {
        self.config.send_grease = enable;
        self
    }

    /// Add a setting sent as-is
    pub fn setting(mut self, id: u64, value: u64) -> Self {
        self.config.additional.insert(id, value);
        self
    }

    /// Set the wire order of setting ids
    pub fn order(mut self, order: Vec<u64>) -> Self {
        self.config.order = Some(order);
        self
    }

    /// Build the configuration
    pub fn build(self) -> SettingsConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::settings::{
        SETTINGS_H3_DATAGRAM, SETTINGS_QPACK_BLOCKED_STREAMS, SETTINGS_QPACK_MAX_TABLE_CAPACITY,
    };

    #[test]
    fn test_default_config() {
        let config = SettingsConfig::default();
        assert_eq!(config.max_field_section_size, None);
        assert!(config.send_grease);
        assert!(config.additional.is_empty());

        assert_eq!(ParserConfig::default().max_settings_frame_size, 8192);
    }

    #[test]
    fn test_builder_to_frame() {
        let frame = SettingsConfig::builder()
            .max_field_section_size(16384)
            .enable_datagrams(true)
            .setting(SETTINGS_QPACK_MAX_TABLE_CAPACITY, 0)
            .setting(SETTINGS_QPACK_BLOCKED_STREAMS, 0)
            .order(vec![SETTINGS_H3_DATAGRAM, SETTINGS_GREASE])
            .build()
            .to_frame();

        assert_eq!(frame.max_field_section_size, Some(16384));
        assert!(frame.datagram);
        assert!(!frame.extended_connect);
        assert_eq!(frame.other.len(), 3);
        assert_eq!(frame.other.get(&SETTINGS_GREASE), Some(&0));
        assert_eq!(frame.order, Some(vec![SETTINGS_H3_DATAGRAM, SETTINGS_GREASE]));
    }

    #[test]
    fn test_without_grease() {
        let frame = SettingsConfig::builder().send_grease(false).build().to_frame();
        assert!(frame.other.is_empty());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: SettingsConfig = serde_json::from_str(
            r#"{ "enable_extended_connect": true, "additional": { "1": 4096 } }"#,
        )
        .unwrap();
        assert!(config.enable_extended_connect);
        assert!(config.send_grease);
        assert_eq!(config.additional.get(&1), Some(&4096));

        let parser: ParserConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parser, ParserConfig::default());
    }
}
