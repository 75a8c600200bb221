use std::fs::File;
use std::io::Read;

use json_comments::StripComments;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dict::lib::{DictResizeFlag, DICT_FORCE_RESIZE_RATIO};
use crate::skiplist::{SKIP_LIST_MAX_LEVEL, SKIP_LIST_P};

pub const CONFIG_PATH_TOML: &str = "./zset.toml";
pub const CONFIG_PATH_JSON: &str = "./zset.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictConfig {
    #[serde(default)]
    pub resize_policy: DictResizeFlag,
    /// with resizing avoided, grow anyway once used/size exceeds this
    #[serde(default = "force_resize_ratio")]
    pub force_resize_ratio: u64,
}

fn force_resize_ratio() -> u64 {
    DICT_FORCE_RESIZE_RATIO
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            resize_policy: DictResizeFlag::default(),
            force_resize_ratio: force_resize_ratio(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipListConfig {
    #[serde(default = "max_level")]
    pub max_level: usize,
    #[serde(default = "p")]
    pub p: f64,
}

fn max_level() -> usize {
    SKIP_LIST_MAX_LEVEL
}

fn p() -> f64 {
    SKIP_LIST_P
}

impl Default for SkipListConfig {
    fn default() -> Self {
        Self {
            max_level: max_level(),
            p: p(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dict: DictConfig,
    #[serde(default)]
    pub skiplist: SkipListConfig,
}

impl Config {
    /// Loads `path`, or `./zset.toml` then `./zset.json` when no path is
    /// given. Any read or parse failure falls back to the defaults.
    pub fn new(path: Option<&str>) -> Self {
        let config_path_show;
        let mut file = if let Some(path) = path {
            config_path_show = path;
            if let Ok(file) = File::open(path) {
                file
            } else {
                warn!(path = config_path_show, "config file read fail, use default config");
                return Config::default();
            }
        } else if let Ok(file) = File::open(CONFIG_PATH_TOML) {
            config_path_show = CONFIG_PATH_TOML;
            file
        } else if let Ok(file) = File::open(CONFIG_PATH_JSON) {
            config_path_show = CONFIG_PATH_JSON;
            file
        } else {
            debug!("no config file found, use default config");
            return Config::default();
        };
        let mut config_string = String::new();
        if let Err(e) = file.read_to_string(&mut config_string) {
            warn!(path = config_path_show, error = %e, "config file read fail, use default config");
            return Config::default();
        }
        debug!(path = config_path_show, "config file loaded");
        if let Ok(config) = Self::from_toml_str(&config_string) {
            return config;
        }
        let config_string = StripComments::new(config_string.as_bytes());
        match serde_json::from_reader(config_string) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = config_path_show, error = %e, "config file parse fail, use default config");
                Config::default()
            }
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
