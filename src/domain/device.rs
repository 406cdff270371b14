// Device and feeder catalog domain models
use super::sample::RawSample;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Pv,
    Battery,
    Ev,
    #[serde(other)]
    Other,
}

impl DeviceType {
    /// Only storage-capable devices report a state of charge.
    pub fn has_storage(&self) -> bool {
        matches!(self, DeviceType::Battery | DeviceType::Ev)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feeder {
    pub feeder_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub site_id: String,
    pub feeder_id: String,
    #[serde(default)]
    pub p_max_kw: f64,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub is_pi: bool,
    #[serde(default)]
    pub is_simulated: bool,
    #[serde(default)]
    pub is_physical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_telemetry: Option<RawSample>,
}

impl Device {
    pub fn new(id: &str, device_type: DeviceType, site_id: &str, feeder_id: &str, p_max_kw: f64) -> Self {
        Self {
            id: id.to_string(),
            device_type,
            site_id: site_id.to_string(),
            feeder_id: feeder_id.to_string(),
            p_max_kw,
            priority: None,
            is_pi: false,
            is_simulated: true,
            is_physical: false,
            latest_telemetry: None,
        }
    }

    pub fn belongs_to(&self, feeder_id: Option<&str>) -> bool {
        feeder_id.is_none_or(|f| self.feeder_id == f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCatalog {
    #[serde(default)]
    pub feeders: Vec<Feeder>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl DeviceCatalog {
    pub fn new(feeders: Vec<Feeder>, devices: Vec<Device>) -> Self {
        Self { feeders, devices }
    }

    /// Devices on the given feeder (all devices for `None`), in catalog order.
    pub fn for_feeder(&self, feeder_id: Option<&str>) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|d| d.belongs_to(feeder_id))
            .cloned()
            .collect()
    }

    pub fn feeder_count(&self, feeder_id: Option<&str>) -> usize {
        match feeder_id {
            Some(id) => self.feeders.iter().filter(|f| f.feeder_id == id).count(),
            None => self.feeders.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_wire_format() {
        let json = r#"{
            "id": "bat-001",
            "type": "battery",
            "siteId": "house-01",
            "feederId": "feeder-a",
            "pMaxKw": 4.0,
            "priority": 2,
            "isPi": true,
            "isSimulated": false,
            "isPhysical": true
        }"#;

        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.device_type, DeviceType::Battery);
        assert_eq!(device.feeder_id, "feeder-a");
        assert_eq!(device.priority, Some(2));
        assert!(device.is_physical);
        assert!(device.latest_telemetry.is_none());
    }

    #[test]
    fn test_unknown_device_type() {
        let json = r#"{"id": "hp-1", "type": "heatpump", "siteId": "s", "feederId": "f"}"#;

        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.device_type, DeviceType::Other);
        assert!(!device.device_type.has_storage());
    }

    #[test]
    fn test_for_feeder_keeps_catalog_order() {
        let catalog = DeviceCatalog::new(
            vec![],
            vec![
                Device::new("ev-002", DeviceType::Ev, "house-01", "feeder-a", 11.0),
                Device::new("pv-001", DeviceType::Pv, "house-01", "feeder-b", 5.0),
                Device::new("ev-001", DeviceType::Ev, "house-01", "feeder-a", 7.2),
            ],
        );

        let ids: Vec<String> = catalog
            .for_feeder(Some("feeder-a"))
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["ev-002", "ev-001"]);
        assert_eq!(catalog.for_feeder(None).len(), 3);
        assert!(catalog.for_feeder(Some("feeder-z")).is_empty());
    }
}
