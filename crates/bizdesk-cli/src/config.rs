// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use bizdesk_app::{BoolLabels, EntityPageConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "bizdesk";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_NAME_FIELD: &str = "name";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub entities: BTreeMap<String, EntitySettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            ui: Ui::default(),
            entities: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub token: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub yes_label: Option<String>,
    pub no_label: Option<String>,
}

/// Per-entity page settings, one `[entities.<name>]` table each.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitySettings {
    #[serde(default)]
    pub name_field: String,
    #[serde(default)]
    pub exclude_from_copy: Vec<String>,
    #[serde(default)]
    pub filter_meta_fields: Vec<String>,
    #[serde(default)]
    pub enable_delete: bool,
    #[serde(default)]
    pub field_order: Vec<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("BIZDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set BIZDESK_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and keep values under [api], [ui], and [entities.<name>]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let base_url = self.base_url();
        let parsed = Url::parse(base_url).with_context(|| {
            format!(
                "api.base_url in {} is not a valid URL: {base_url:?}",
                path.display()
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url in {} must be an http(s) URL, got {base_url:?}",
                path.display()
            );
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        for (entity, settings) in &self.entities {
            if settings.name_field.trim().is_empty() {
                bail!(
                    "entities.{entity}.name_field in {} must not be empty",
                    path.display()
                );
            }
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn token(&self) -> Option<&str> {
        self.api
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn bool_labels(&self) -> BoolLabels {
        let defaults = BoolLabels::default();
        BoolLabels {
            yes: self.ui.yes_label.clone().unwrap_or(defaults.yes),
            no: self.ui.no_label.clone().unwrap_or(defaults.no),
        }
    }

    /// Page settings for `entity`; unlisted entities get read-only defaults.
    pub fn page_config(&self, entity: &str) -> EntityPageConfig {
        let page = match self.entities.get(entity) {
            Some(settings) => EntityPageConfig::new(entity, settings.name_field.trim())
                .with_exclude_from_copy(settings.exclude_from_copy.clone())
                .with_filter_meta_fields(settings.filter_meta_fields.clone())
                .with_field_order(settings.field_order.clone())
                .with_delete(settings.enable_delete),
            None => EntityPageConfig::new(entity, DEFAULT_NAME_FIELD),
        };
        page.with_bool_labels(self.bool_labels())
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# bizdesk config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\ntimeout = \"{}\"\n# Optional static bearer token\n# token = \"\"\n\n[ui]\nyes_label = \"Yes\"\nno_label = \"No\"\n\n[entities.accounts]\nname_field = \"account_name\"\nexclude_from_copy = [\"production_orders\", \"payments\"]\nfilter_meta_fields = [\"allowed_actions\"]\nenable_delete = true\nfield_order = [\"account_name\", \"status\"]\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 10s)")
}
