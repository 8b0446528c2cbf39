//! Provider configuration.
//!
//! The file names the active provider at the top level and holds one table per
//! provider:
//!
//! ```toml
//! provider = "rackspace"
//!
//! [rackspace]
//! name = "rackspace-cloudservers-us"
//! identity = "user"
//! credential = "api-key"
//! location = "DFW"
//! image = "Ubuntu 12.04"
//! hardware = "2"
//! ```
//!
//! Loading is a pure function from text to an immutable [`ProviderConfig`];
//! nothing mutates it afterwards.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Resolved settings of the active provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider key selected at the top of the file (e.g. "aws", "rackspace")
    pub provider: String,
    /// Provider API name
    pub name: String,
    /// Account identity
    pub identity: String,
    /// Account credential
    pub credential: String,
    /// Location / region id
    pub location: String,
    /// Image name pattern
    pub image: String,
    /// Hardware / flavor id as written in the file
    pub hardware: String,
    /// Optional driver executable for this provider
    pub driver: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    provider: Option<String>,
    #[serde(flatten)]
    sections: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSection {
    name: Option<String>,
    identity: Option<String>,
    credential: Option<String>,
    location: Option<String>,
    image: Option<String>,
    hardware: Option<String>,
    driver: Option<String>,
}

impl ProviderConfig {
    /// Parse a provider file.
    ///
    /// Fails with [`Error::ConfigurationLoad`] naming the first missing
    /// property as `<provider>.<property>`.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawFile = toml::from_str(content)
            .map_err(|e| Error::config(format!("invalid provider file: {e}")))?;

        let provider = raw
            .provider
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::config("missing property 'provider'"))?;

        let section: RawSection = match raw.sections.get(&provider) {
            Some(value) => value
                .clone()
                .try_into()
                .map_err(|e| Error::config(format!("invalid [{provider}] table: {e}")))?,
            None => return Err(Error::config(format!("missing table [{provider}]"))),
        };

        let require = |value: Option<String>, key: &str| -> Result<String> {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::config(format!("missing property '{provider}.{key}'")))
        };

        Ok(Self {
            name: require(section.name, "name")?,
            identity: require(section.identity, "identity")?,
            credential: require(section.credential, "credential")?,
            location: require(section.location, "location")?,
            image: require(section.image, "image")?,
            hardware: require(section.hardware, "hardware")?,
            driver: section.driver.filter(|d| !d.trim().is_empty()),
            provider,
        })
    }

    /// Hardware id to put in the template.
    ///
    /// Zone-scoped providers want `<location>/<hardware>`; aws takes the
    /// flavor as-is.
    pub fn hardware_id(&self) -> String {
        if self.provider == "aws" {
            self.hardware.clone()
        } else {
            format!("{}/{}", self.location, self.hardware)
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("credential", &"<redacted>")
            .field("location", &self.location)
            .field("image", &self.image)
            .field("hardware", &self.hardware)
            .field("driver", &self.driver)
            .finish()
    }
}
