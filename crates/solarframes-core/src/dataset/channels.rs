use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::error::{DatasetError, InvalidChannelSetSnafu};

/// Channels loaded when the caller does not choose any.
pub const DEFAULT_CHANNELS: [&str; 7] = [
    "hmi_m", "aia_0094", "aia_0131", "aia_0171", "aia_0193", "aia_0211", "aia_1600",
];

/// Ordered, non-empty list of channel names.
///
/// The order is significant twice: it is the stacking order of produced
/// frames, and it is part of the index cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ChannelSet(Vec<String>);

impl ChannelSet {
    /// Validate and wrap a channel list.
    pub fn new<I, S>(names: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        ensure!(
            !names.is_empty(),
            InvalidChannelSetSnafu {
                reason: "at least one channel is required"
            }
        );
        for name in &names {
            ensure!(
                !name.is_empty() && !name.contains(['.', '/']),
                InvalidChannelSetSnafu {
                    reason: format!("channel name '{name}' must be non-empty without '.' or '/'")
                }
            );
        }
        Ok(Self(names))
    }

    /// Channel names in stack order.
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Record field suffixes (`.<name>.npy`) in stack order.
    pub fn suffixes(&self) -> Vec<String> {
        self.0.iter().map(|c| format!(".{c}.npy")).collect()
    }

    /// Names joined with `sep`.
    pub fn joined(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self(DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect())
    }
}

impl TryFrom<Vec<String>> for ChannelSet {
    type Error = DatasetError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelSet> for Vec<String> {
    fn from(value: ChannelSet) -> Self {
        value.0
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_follow_channel_order() {
        let set = ChannelSet::new(["aia_0171", "hmi_m"]).unwrap();
        assert_eq!(set.suffixes(), vec![".aia_0171.npy", ".hmi_m.npy"]);
        assert_eq!(set.joined("_"), "aia_0171_hmi_m");
        assert_eq!(set.to_string(), "aia_0171, hmi_m");
    }

    #[test]
    fn rejects_empty_and_dotted_names() {
        assert!(ChannelSet::new(Vec::<String>::new()).is_err());
        assert!(ChannelSet::new(["aia.0171"]).is_err());
        assert!(ChannelSet::new(["a", ""]).is_err());
        assert!(ChannelSet::new(["a/b"]).is_err());
    }

    #[test]
    fn default_has_seven_channels() {
        let set = ChannelSet::default();
        assert_eq!(set.len(), 7);
        assert_eq!(set.names()[0], "hmi_m");
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let set: ChannelSet = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(set.names(), &["a".to_string(), "b".to_string()]);
        assert!(serde_json::from_str::<ChannelSet>("[]").is_err());
    }
}
