//! Single-site configuration files.

use crate::error::ConfigError;
use crate::validation::{Collector, ValidationResult, validate_params_in};
use serde::{Deserialize, Serialize};
use sprit_core::{
    HvsrParams, InstrumentResponse, SiteInput, SiteMetadata, ThreeComponent, TimeWindow,
};
use sprit_io::{ChannelOrder, WavSource};
use std::path::{Path, PathBuf};

/// Where a site's recording lives and how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Three-channel WAV file. Relative paths resolve against the directory
    /// of the configuration file.
    pub path: PathBuf,
    /// Component of each WAV channel, e.g. `"ZNE"` or `"EHZ,EHN,EHE"`.
    pub channel_order: String,
    /// Recording start in seconds since the Unix epoch.
    pub start_time: f64,
    /// Operator-selected exclusion windows as `[start, end]` offsets in seconds.
    pub manual_windows: Vec<[f64; 2]>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            channel_order: "ZNE".to_string(),
            start_time: 0.0,
            manual_windows: Vec::new(),
        }
    }
}

impl DataConfig {
    /// Parsed channel order.
    pub fn channel_order(&self, site: &str) -> Result<ChannelOrder, ConfigError> {
        self.channel_order
            .parse()
            .map_err(|source| ConfigError::ChannelOrder {
                site: site.to_string(),
                source,
            })
    }

    /// Manual windows as [`TimeWindow`]s. Ordering and overlap are checked by
    /// the pipeline.
    pub fn manual_windows(&self) -> Vec<TimeWindow> {
        self.manual_windows
            .iter()
            .map(|&[start, end]| TimeWindow { start, end })
            .collect()
    }

    /// Loader source for this recording.
    pub fn source(&self, site: &str) -> Result<WavSource, ConfigError> {
        Ok(WavSource {
            path: self.path.clone(),
            channel_order: self.channel_order(site)?,
            start_time: self.start_time,
        })
    }

    pub(crate) fn check(&self, c: &mut Collector, prefix: &str) {
        for (i, &[start, end]) in self.manual_windows.iter().enumerate() {
            if !(start >= 0.0 && end > start) {
                c.push(crate::ValidationError::Invalid {
                    param: format!("{prefix}manual_windows[{i}]"),
                    reason: format!("need 0 <= start < end, got [{start}, {end}]"),
                });
            }
        }
    }
}

/// Instrument responses: one shared description with optional
/// per-component replacements. Missing entries are flat.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Response used for every component without its own entry.
    pub all: Option<InstrumentResponse>,
    /// Vertical component.
    pub z: Option<InstrumentResponse>,
    /// North component.
    pub n: Option<InstrumentResponse>,
    /// East component.
    pub e: Option<InstrumentResponse>,
}

impl ResponseConfig {
    /// Effective response per component.
    pub fn resolve(&self) -> ThreeComponent<InstrumentResponse> {
        let pick = |own: &Option<InstrumentResponse>| {
            own.clone()
                .or_else(|| self.all.clone())
                .unwrap_or_else(InstrumentResponse::flat)
        };
        ThreeComponent::new(pick(&self.z), pick(&self.n), pick(&self.e))
    }

    /// Entries `self` leaves empty are taken from `fallback`.
    pub fn or(&self, fallback: &ResponseConfig) -> ResponseConfig {
        ResponseConfig {
            all: self.all.clone().or_else(|| fallback.all.clone()),
            z: self.z.clone().or_else(|| fallback.z.clone()),
            n: self.n.clone().or_else(|| fallback.n.clone()),
            e: self.e.clone().or_else(|| fallback.e.clone()),
        }
    }

    pub(crate) fn check(&self, c: &mut Collector, prefix: &str) {
        let entries = [("all", &self.all), ("z", &self.z), ("n", &self.n), ("e", &self.e)];
        for (name, response) in entries {
            if let Some(Err(sprit_core::HvsrError::InvalidParameter { reason, .. })) =
                response.as_ref().map(InstrumentResponse::validate)
            {
                c.push(crate::ValidationError::Invalid {
                    param: format!("{prefix}responses.{name}"),
                    reason,
                });
            }
        }
    }
}

/// One site: metadata, recording, responses and processing parameters.
///
/// ```toml
/// [site]
/// site = "KS-01"
/// acquisition_date = "2023-06-14"
///
/// [data]
/// path = "ks01.wav"
/// channel_order = "ZNE"
/// manual_windows = [[0.0, 30.0]]
///
/// [params.noise]
/// method = "anti_trigger"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site description.
    pub site: SiteMetadata,
    /// Recording.
    pub data: DataConfig,
    /// Instrument responses.
    pub responses: ResponseConfig,
    /// Processing parameters; omitted keys keep their defaults.
    pub params: HvsrParams,
}

impl SiteConfig {
    /// Load a site file. Relative data paths are resolved against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let mut config = Self::from_toml(&content)?;
        if let Some(dir) = path.parent() {
            config.data.path = resolve_relative(dir, &config.data.path);
        }
        tracing::debug!(
            path = %path.display(),
            site = %config.site.site,
            "loaded site configuration"
        );
        Ok(config)
    }

    /// Parse a site from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to a file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        crate::batch::save_toml(path.as_ref(), &self.to_toml()?)
    }

    /// Check the site, reporting every violation.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut c = Collector::default();
        if self.site.site.trim().is_empty() {
            c.push(crate::ValidationError::EmptySiteName(1));
        }
        if self.data.path.as_os_str().is_empty() {
            c.push(crate::ValidationError::Invalid {
                param: "data.path".to_string(),
                reason: "must name a WAV file".to_string(),
            });
        }
        if let Err(e) = self.data.channel_order.parse::<ChannelOrder>() {
            c.push(crate::ValidationError::Invalid {
                param: "data.channel_order".to_string(),
                reason: e.to_string(),
            });
        }
        self.data.check(&mut c, "data.");
        self.responses.check(&mut c, "");
        c.absorb(validate_params_in(&self.params, "params"));
        c.finish()
    }

    /// Pipeline input for an already loaded recording.
    pub fn input(&self, record: sprit_core::SeismicRecord) -> SiteInput {
        SiteInput {
            metadata: self.site.clone(),
            record,
            responses: self.responses.resolve(),
            manual_windows: self.data.manual_windows(),
        }
    }
}

pub(crate) fn resolve_relative(dir: &Path, path: &Path) -> PathBuf {
    if path.is_relative() && !path.as_os_str().is_empty() {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprit_core::{CombinationMethod, Component, NoiseRemovalMethod};

    const SITE: &str = r#"
        [site]
        site = "KS-01"
        acquisition_date = "2023-06-14"
        latitude = 38.9

        [data]
        path = "ks01.wav"
        channel_order = "NEZ"
        start_time = 1686700800.0
        manual_windows = [[0.0, 30.0], [300.0, 330.0]]

        [responses.all]
        sensitivity = 2.0

        [responses.z]
        sensitivity = 3.0

        [params.noise]
        method = "anti_trigger"

        [params.process]
        method = 4
    "#;

    #[test]
    fn parses_full_site() {
        let c = SiteConfig::from_toml(SITE).unwrap();
        assert_eq!(c.site.site, "KS-01");
        assert_eq!(c.site.latitude, 38.9);
        assert_eq!(c.data.manual_windows().len(), 2);
        let order = c.data.channel_order("KS-01").unwrap();
        assert_eq!(order.component(0), Component::N);
        assert_eq!(c.params.noise.method, NoiseRemovalMethod::AntiTrigger);
        assert_eq!(c.params.process.method, CombinationMethod::VectorSum);
        assert_eq!(c.params.psd.window_length, 60.0);
        c.validate().unwrap();
    }

    #[test]
    fn responses_fall_back_to_shared_entry() {
        let c = SiteConfig::from_toml(SITE).unwrap();
        let r = c.responses.resolve();
        assert_eq!(r.z.sensitivity, 3.0);
        assert_eq!(r.n.sensitivity, 2.0);
        assert_eq!(r.e.sensitivity, 2.0);
        let flat = ResponseConfig::default().resolve();
        assert_eq!(flat.z, InstrumentResponse::flat());
    }

    #[test]
    fn validation_collects_site_and_param_problems() {
        let mut c = SiteConfig::from_toml(SITE).unwrap();
        c.data.channel_order = "ZZZ".into();
        c.data.manual_windows.push([50.0, 40.0]);
        c.params.noise.lta = 1.0;
        let err = c.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("data.channel_order"), "{msg}");
        assert!(msg.contains("data.manual_windows[2]"), "{msg}");
        assert!(msg.contains("params.noise.lta"), "{msg}");
        assert_eq!(err.errors().len(), 3);
    }

    #[test]
    fn method_index_one_does_not_parse() {
        let err = SiteConfig::from_toml("[params.process]\nmethod = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = Path::new("/surveys/2023");
        assert_eq!(
            resolve_relative(dir, Path::new("a.wav")),
            PathBuf::from("/surveys/2023/a.wav")
        );
        assert_eq!(
            resolve_relative(dir, Path::new("/data/a.wav")),
            PathBuf::from("/data/a.wav")
        );
    }
}
