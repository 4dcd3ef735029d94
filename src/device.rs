//! Device-class detection and visual lead-time adjustment.
//!
//! Phones and tablets usually show more display and audio output latency, so
//! highlights are pushed further ahead of the audio clock on them. Detection
//! sits behind [`DeviceClassifier`] so hosts can inject it and tests can stub
//! it.

/// Extra lead time for devices with higher display/audio latency.
pub const MOBILE_LEAD_TIME_ADJUSTMENT: f64 = 0.2;

const MOBILE_KEYWORDS: [&str; 7] = [
    "mobile",
    "android",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "webos",
];

/// Screens at most this wide count as small.
const SMALL_SCREEN_WIDTH: u32 = 768;

pub trait DeviceClassifier {
    /// True for devices that tolerate less latency and need extra lead time.
    fn is_low_latency_tolerance_device(&self) -> bool;
}

/// A classifier with a fixed answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticDevice(pub bool);

impl DeviceClassifier for StaticDevice {
    fn is_low_latency_tolerance_device(&self) -> bool {
        self.0
    }
}

/// Classifies from the user agent, touch support and screen width.
///
/// A device is mobile when the user agent names a mobile platform, or when it
/// is touch capable and has a small screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentClassifier {
    pub user_agent: String,
    pub touch_capable: bool,
    pub screen_width: u32,
}

impl DeviceClassifier for UserAgentClassifier {
    fn is_low_latency_tolerance_device(&self) -> bool {
        let agent = self.user_agent.to_lowercase();
        let mobile_agent = MOBILE_KEYWORDS.iter().any(|keyword| agent.contains(keyword));
        mobile_agent || (self.touch_capable && self.screen_width <= SMALL_SCREEN_WIDTH)
    }
}

/// Lead time after the device-class adjustment.
pub fn adjusted_lead_time(base: f64, device: &dyn DeviceClassifier, adjustment: f64) -> f64 {
    if device.is_low_latency_tolerance_device() {
        base + adjustment
    } else {
        base
    }
}
