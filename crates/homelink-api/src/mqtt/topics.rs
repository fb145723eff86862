//! Topic layout: `<namespace>/<device_id>/out/control` for commands and
//! `<namespace>/<device_id>/in/status` for reports.

use super::wire::DeviceId;

pub const DEFAULT_NAMESPACE: &str = "smarthome";

const STATUS_SUFFIX: [&str; 2] = ["in", "status"];
const CONTROL_SUFFIX: [&str; 2] = ["out", "control"];

/// What an inbound topic addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    /// A device status report.
    Status(DeviceId),
    /// A command published to a device (ours or another client's).
    ControlEcho(DeviceId),
}

/// Deterministic mapping between device ids and topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    namespace: String,
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl TopicRouter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Topic commands for `device` are published on.
    pub fn control_topic(&self, device: &DeviceId) -> String {
        format!("{}/{device}/out/control", self.namespace)
    }

    /// Topic `device` publishes its status on.
    pub fn status_topic(&self, device: &DeviceId) -> String {
        format!("{}/{device}/in/status", self.namespace)
    }

    /// Subscription filter matching every device's status topic.
    pub fn status_filter(&self) -> String {
        format!("{}/+/in/status", self.namespace)
    }

    /// Subscription filter matching every device's control topic.
    pub fn control_filter(&self) -> String {
        format!("{}/+/out/control", self.namespace)
    }

    /// Classify an inbound topic. Returns `None` for topics outside the
    /// namespace or with an unexpected shape.
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        let mut parts = topic.split('/');
        if parts.next()? != self.namespace {
            return None;
        }
        let device = parts.next()?.parse::<DeviceId>().ok()?;
        let suffix = [parts.next()?, parts.next()?];
        if parts.next().is_some() {
            return None;
        }
        if suffix == STATUS_SUFFIX {
            Some(TopicKind::Status(device))
        } else if suffix == CONTROL_SUFFIX {
            Some(TopicKind::ControlEcho(device))
        } else {
            None
        }
    }
}
