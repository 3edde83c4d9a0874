use serde::Deserialize;

/// Embedded status code signalling success in every SwitchBot v1.1 response.
pub const SUCCESS_STATUS_CODE: i64 = 100;

/// Envelope wrapping every endpoint's payload: `{statusCode, message, body}`.
/// Anything other than `statusCode == 100` is an application-level error and
/// must not be retried.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: i64,
    #[serde(default)]
    pub message: String,
    pub body: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status_code == SUCCESS_STATUS_CODE
    }
}

/// Raw hub status body. Every field may be absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light_level: Option<i64>,
    pub device_type: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceList {
    #[serde(default)]
    pub device_list: Vec<Device>,
    #[serde(default)]
    pub infrared_remote_list: Vec<InfraredRemote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub hub_device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraredRemote {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub remote_type: Option<String>,
    pub hub_device_id: Option<String>,
}
