//! Batch configuration files.
//!
//! A batch file holds shared defaults and a list of sites. Each site may
//! override any subset of the defaults with a partial `params` table:
//!
//! ```toml
//! base_dir = "recordings"
//!
//! [defaults.noise]
//! method = "anti_trigger"
//!
//! [[sites]]
//! [sites.site]
//! site = "KS-01"
//! [sites.data]
//! path = "ks01.wav"
//!
//! [[sites]]
//! [sites.site]
//! site = "KS-02"
//! [sites.data]
//! path = "ks02.wav"
//! [sites.params.peaks]
//! hvsr_band = [0.5, 20.0]
//! ```

use crate::error::ConfigError;
use crate::site::{DataConfig, ResponseConfig, resolve_relative};
use crate::validation::{Collector, ValidationResult, validate_params_in, validate_site_names};
use serde::{Deserialize, Serialize};
use sprit_core::{
    BatchResult, BatchSite, HvsrError, HvsrParams, SiteMetadata, SiteOutcome, WaveformLoader,
    run_batch,
};
use sprit_io::WavSource;
use std::path::{Path, PathBuf};

/// One entry of a batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSiteConfig {
    /// Site description.
    pub site: SiteMetadata,
    /// Recording.
    pub data: DataConfig,
    /// Responses; empty entries fall back to the batch-level responses.
    pub responses: ResponseConfig,
    /// Partial parameter table merged over the batch defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<toml::Table>,
}

/// A batch of sites sharing default parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory relative WAV paths resolve against. Itself relative to
    /// the batch file when loaded from disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    /// Parameters for every site without an override.
    pub defaults: HvsrParams,
    /// Responses for every site without its own.
    pub responses: ResponseConfig,
    /// The sites, processed in order.
    pub sites: Vec<BatchSiteConfig>,
}

impl BatchConfig {
    /// Load a batch file, resolving `base_dir` against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let mut config = Self::from_toml(&content)?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        config.base_dir = Some(match &config.base_dir {
            Some(base) => resolve_relative(dir, base),
            None => dir.to_path_buf(),
        });
        tracing::debug!(
            path = %path.display(),
            sites = config.sites.len(),
            "loaded batch configuration"
        );
        Ok(config)
    }

    /// Parse a batch from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to a file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        save_toml(path.as_ref(), &self.to_toml()?)
    }

    /// Effective parameters for site `index`: the defaults with the site's
    /// override table merged on top.
    pub fn site_params(&self, index: usize) -> Result<HvsrParams, ConfigError> {
        let Some(entry) = self.sites.get(index) else {
            return Ok(self.defaults.clone());
        };
        match &entry.params {
            None => Ok(self.defaults.clone()),
            Some(overrides) => merge_params(&self.defaults, overrides).map_err(|reason| {
                ConfigError::InvalidOverride {
                    site: entry.site.site.clone(),
                    reason,
                }
            }),
        }
    }

    /// Check every site, reporting all violations at once. Unparseable
    /// overrides are reported as invalid `sites.<name>.params`.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut c = Collector::default();
        c.absorb(self.validate_shared());
        for i in 0..self.sites.len() {
            c.absorb(self.validate_site(i));
        }
        c.finish()
    }

    /// Problems that concern the whole batch: the site list and the
    /// defaults.
    pub fn validate_shared(&self) -> ValidationResult<()> {
        let mut c = Collector::default();
        c.absorb(validate_site_names(
            self.sites.iter().map(|s| s.site.site.as_str()),
        ));
        c.absorb(validate_params_in(&self.defaults, "defaults"));
        c.finish()
    }

    /// Problems confined to site `index`. Out-of-range indices are valid.
    pub fn validate_site(&self, index: usize) -> ValidationResult<()> {
        let mut c = Collector::default();
        let Some(entry) = self.sites.get(index) else {
            return c.finish();
        };
        let prefix = format!("sites.{}", entry.site.site);
        if entry.data.path.as_os_str().is_empty() {
            c.push(crate::ValidationError::Invalid {
                param: format!("{prefix}.data.path"),
                reason: "must name a WAV file".to_string(),
            });
        }
        if let Err(e) = entry.data.channel_order.parse::<sprit_io::ChannelOrder>() {
            c.push(crate::ValidationError::Invalid {
                param: format!("{prefix}.data.channel_order"),
                reason: e.to_string(),
            });
        }
        entry.data.check(&mut c, &format!("{prefix}.data."));
        entry.responses.check(&mut c, &format!("{prefix}."));
        if entry.params.is_some() {
            match self.site_params(index) {
                Ok(params) => c.absorb(validate_params_in(&params, &prefix)),
                Err(e) => c.push(crate::ValidationError::Invalid {
                    param: format!("{prefix}.params"),
                    reason: e.to_string(),
                }),
            }
        }
        c.finish()
    }

    /// Batch sites ready for [`sprit_core::run_batch`].
    ///
    /// Only batch-wide problems fail the call. A site whose own entry is
    /// invalid is set aside in [`ResolvedBatch::rejected`] and the rest of
    /// the batch still runs.
    pub fn resolve(&self) -> Result<ResolvedBatch, ConfigError> {
        self.validate_shared()?;
        let mut resolved = ResolvedBatch::default();
        for (i, entry) in self.sites.iter().enumerate() {
            let site = self
                .validate_site(i)
                .map_err(ConfigError::from)
                .and_then(|()| self.batch_site(i, entry));
            match site {
                Ok(site) => resolved.sites.push((i, site)),
                Err(e) => {
                    tracing::warn!(site = %entry.site.site, error = %e, "site rejected");
                    resolved.rejected.push((i, entry.site.clone(), e));
                }
            }
        }
        Ok(resolved)
    }

    fn batch_site(
        &self,
        index: usize,
        entry: &BatchSiteConfig,
    ) -> Result<BatchSite<WavSource>, ConfigError> {
        let mut source = entry.data.source(&entry.site.site)?;
        if let Some(base) = &self.base_dir {
            source.path = resolve_relative(base, &source.path);
        }
        Ok(BatchSite {
            metadata: entry.site.clone(),
            source,
            responses: entry.responses.or(&self.responses).resolve(),
            manual_windows: entry.data.manual_windows(),
            params: entry.params.as_ref().map(|_| self.site_params(index)).transpose()?,
        })
    }
}

/// A batch split into runnable sites and sites rejected by validation.
/// Both keep their position in the batch file.
#[derive(Debug, Default)]
pub struct ResolvedBatch {
    /// Runnable sites with their batch position.
    pub sites: Vec<(usize, BatchSite<WavSource>)>,
    /// Rejected sites with their batch position and the reason.
    pub rejected: Vec<(usize, SiteMetadata, ConfigError)>,
}

impl ResolvedBatch {
    /// Number of sites, runnable or not.
    pub fn len(&self) -> usize {
        self.sites.len() + self.rejected.len()
    }

    /// True if the batch lists no sites.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every runnable site. Rejected sites become outcomes failed at
    /// parameter validation; all outcomes come back in batch order.
    pub fn run<L: WaveformLoader<Source = WavSource>>(
        self,
        loader: &L,
        defaults: &HvsrParams,
        mut progress: impl FnMut(&SiteOutcome),
    ) -> BatchResult {
        let total = self.len();
        let mut slots: Vec<Option<SiteOutcome>> = (0..total).map(|_| None).collect();

        for (i, metadata, error) in self.rejected {
            let outcome = SiteOutcome::rejected(metadata, HvsrError::Rejected(error.to_string()));
            progress(&outcome);
            slots[i] = Some(outcome);
        }

        let (positions, sites): (Vec<usize>, Vec<_>) = self.sites.into_iter().unzip();
        let ran = run_batch(loader, &sites, defaults, |_, outcome| progress(outcome));
        for (i, outcome) in positions.into_iter().zip(ran.outcomes) {
            slots[i] = Some(outcome);
        }

        BatchResult {
            outcomes: slots.into_iter().flatten().collect(),
        }
    }
}

fn merge_params(defaults: &HvsrParams, overrides: &toml::Table) -> Result<HvsrParams, String> {
    let mut base = match toml::Value::try_from(defaults).map_err(|e| e.to_string())? {
        toml::Value::Table(t) => t,
        other => return Err(format!("defaults serialized to {}", other.type_str())),
    };
    merge_tables(&mut base, overrides);
    toml::Value::Table(base)
        .try_into()
        .map_err(|e: toml::de::Error| e.message().to_string())
}

/// Recursive merge; tables combine key by key, anything else is replaced.
fn merge_tables(base: &mut toml::Table, overrides: &toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(dst)), toml::Value::Table(src)) => merge_tables(dst, src),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

pub(crate) fn save_toml(path: &Path, content: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprit_core::{FreqSmoothing, NoiseRemovalMethod};

    const BATCH: &str = r#"
        base_dir = "/recordings"

        [defaults.noise]
        method = "anti_trigger"

        [defaults.psd]
        window_length = 30.0

        [responses.all]
        sensitivity = 4.0

        [[sites]]
        [sites.site]
        site = "KS-01"
        [sites.data]
        path = "ks01.wav"

        [[sites]]
        [sites.site]
        site = "KS-02"
        [sites.data]
        path = "/elsewhere/ks02.wav"
        channel_order = "ENZ"
        [sites.responses.z]
        sensitivity = 1.5
        [sites.params.psd]
        overlap = 0.25
        [sites.params.process.freq_smoothing]
        kind = "konno_ohmachi"
        bandwidth = 20.0
    "#;

    #[test]
    fn override_merges_over_defaults() {
        let batch = BatchConfig::from_toml(BATCH).unwrap();
        let first = batch.site_params(0).unwrap();
        assert_eq!(first, batch.defaults);

        let second = batch.site_params(1).unwrap();
        assert_eq!(second.psd.overlap, 0.25);
        // untouched keys of an overridden table keep the batch default
        assert_eq!(second.psd.window_length, 30.0);
        assert_eq!(second.noise.method, NoiseRemovalMethod::AntiTrigger);
        assert_eq!(
            second.process.freq_smoothing,
            FreqSmoothing::KonnoOhmachi { bandwidth: 20.0 }
        );
    }

    #[test]
    fn resolve_builds_batch_sites() {
        let batch = BatchConfig::from_toml(BATCH).unwrap();
        let resolved = batch.resolve().unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.rejected.is_empty());
        let sites: Vec<_> = resolved.sites.iter().map(|(_, s)| s).collect();
        assert_eq!(sites[0].source.path, PathBuf::from("/recordings/ks01.wav"));
        assert_eq!(sites[1].source.path, PathBuf::from("/elsewhere/ks02.wav"));
        assert!(sites[0].params.is_none());
        assert!(sites[1].params.is_some());
        assert_eq!(sites[0].responses.z.sensitivity, 4.0);
        assert_eq!(sites[1].responses.z.sensitivity, 1.5);
        assert_eq!(sites[1].responses.e.sensitivity, 4.0);
    }

    struct Unreachable;

    impl WaveformLoader for Unreachable {
        type Source = WavSource;

        fn load(&self, source: &WavSource) -> sprit_core::Result<sprit_core::Waveform> {
            Err(HvsrError::Load(format!("{} is offline", source.path.display())))
        }
    }

    #[test]
    fn bad_site_override_does_not_abort_the_batch() {
        let mut batch = BatchConfig::from_toml(BATCH).unwrap();
        let bad: toml::Table = toml::from_str("[noise]\nlta = 1.0\n").unwrap();
        batch.sites[0].params = Some(bad);

        let resolved = batch.resolve().unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.sites.len(), 1);
        assert_eq!(resolved.sites[0].0, 1);
        let (position, metadata, err) = &resolved.rejected[0];
        assert_eq!((*position, metadata.site.as_str()), (0, "KS-01"));
        assert!(err.to_string().contains("sites.KS-01.noise.lta"), "{err}");

        let mut seen = Vec::new();
        let result = resolved.run(&Unreachable, &batch.defaults, |o| {
            seen.push(o.metadata.site.clone());
        });
        assert_eq!(seen.len(), 2);
        let names: Vec<_> = result.outcomes.iter().map(|o| o.metadata.site.as_str()).collect();
        assert_eq!(names, vec!["KS-01", "KS-02"]);
        let first = result.outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(first.stage(), Some(sprit_core::Stage::Params));
        let second = result.outcomes[1].result.as_ref().unwrap_err();
        assert_eq!(second.stage(), Some(sprit_core::Stage::FetchData));
    }

    #[test]
    fn unparseable_override_and_bad_channel_order_are_rejected_per_site() {
        let mut batch = BatchConfig::from_toml(BATCH).unwrap();
        let mut bad = toml::Table::new();
        bad.insert("psd".into(), toml::Value::String("oops".into()));
        batch.sites[0].params = Some(bad);
        batch.sites[1].data.channel_order = "ZZZ".into();
        let resolved = batch.resolve().unwrap();
        assert!(resolved.sites.is_empty());
        assert_eq!(resolved.rejected.len(), 2);
        assert!(!resolved.is_empty());
    }

    #[test]
    fn bad_override_is_reported_per_site() {
        let mut batch = BatchConfig::from_toml(BATCH).unwrap();
        let mut bad = toml::Table::new();
        bad.insert("psd".into(), toml::Value::String("oops".into()));
        batch.sites[0].params = Some(bad);
        assert!(matches!(
            batch.site_params(0),
            Err(ConfigError::InvalidOverride { ref site, .. }) if site == "KS-01"
        ));
        let err = batch.validate().unwrap_err();
        assert!(err.to_string().contains("sites.KS-01.params"), "{err}");
    }

    #[test]
    fn validation_collects_across_sites() {
        let mut batch = BatchConfig::from_toml(BATCH).unwrap();
        batch.sites[1].site.site = "KS-01".into();
        batch.sites[0].data.channel_order = "XYZ".into();
        batch.defaults.noise.sta = 0.0;
        let err = batch.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate site name: KS-01"), "{msg}");
        assert!(msg.contains("defaults.noise.sta"), "{msg}");
        assert!(msg.contains("sites.KS-01.data.channel_order"), "{msg}");
        assert!(batch.resolve().is_err());
    }

    #[test]
    fn empty_batch_is_invalid() {
        let err = BatchConfig::default().validate().unwrap_err();
        assert_eq!(err, crate::ValidationError::NoSites);
    }

    #[test]
    fn nested_tables_merge_recursively() {
        let mut base: toml::Table = toml::from_str("a = 1\n[t]\nx = 1\ny = 2\n").unwrap();
        let over: toml::Table = toml::from_str("[t]\ny = 3\nz = 4\n").unwrap();
        merge_tables(&mut base, &over);
        let t = base["t"].as_table().unwrap();
        assert_eq!(t["x"].as_integer(), Some(1));
        assert_eq!(t["y"].as_integer(), Some(3));
        assert_eq!(t["z"].as_integer(), Some(4));
        assert_eq!(base["a"].as_integer(), Some(1));
    }
}
