use std::fmt::{Debug, Display};
use std::path::PathBuf;
use std::str::FromStr;
use anyhow::anyhow;
use serde_derive::{Serialize, Deserialize};
use sqlkv::textfmt::EncodingFormat;

const DEFAULT_STORAGE_PATH: &str = "storage/kvdb";
pub const DEFAULT_PROMPT: &str = "kvcli";
pub const DEFAULT_DB_NAME: &str = "kvdb";

/// Which `storage::Engine` backend a `server::session::Session` should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    Memory,
    LogCask,
}

impl Default for StorageEngine {
    fn default() -> Self {
        StorageEngine::LogCask
    }
}

impl FromStr for StorageEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageEngine::Memory),
            "logcask" => Ok(StorageEngine::LogCask),
            _ => Err(anyhow!("Unknown storage engine: {}", s)),
        }
    }
}

impl Display for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageEngine::Memory => write!(f, "memory"),
            StorageEngine::LogCask => write!(f, "logcask"),
        }
    }
}

/// Raw-value display options (`\x`-style), independent of the core
/// order-preserving `encoding` module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    pub default_format: String,
    pub auto_detect: bool,
    pub batch_size: usize,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        EncodingConfig {
            default_format: "base64".to_string(),
            auto_detect: true,
            batch_size: 100,
        }
    }
}

impl EncodingConfig {
    pub fn get_default_format(&self) -> anyhow::Result<EncodingFormat> {
        self.default_format.parse().map_err(|e: sqlkv::textfmt::EncodingError| anyhow!(e.to_string()))
    }

    pub fn set_default_format(&mut self, format: EncodingFormat) {
        self.default_format = format.to_string();
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.get_default_format()?;
        if self.batch_size == 0 || self.batch_size > 10000 {
            return Err(anyhow!("batch_size must be between 1 and 10000, got {}", self.batch_size));
        }
        Ok(())
    }
}

//! load configration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLoad {
    version: u8,

    api_key: String,

    /// load config path, default '${pwd}/config'
    storage_path: Option<PathBuf>,

    /// where the selected storage backend keeps its data on disk. Only
    /// consulted by `StorageEngine::LogCask`; ignored for `Memory`.
    data_dir: Option<PathBuf>,

    /// which `storage::Engine` backend `Session` opens.
    storage_engine: Option<StorageEngine>,

    /// prompt
    pub prompt: Option<String>,

    /// Show stats after executing queries.  Only works with non-interactive mode.
    pub show_stats: Option<bool>,

    /// fix part cmd options. default false
    auto_append_part_cmd: Option<bool>,
    /// Division symbol
    auto_append_part_cmd_symbol: Option<char>,

    /// Multi line mode, default is true.
    pub multi_line: Option<bool>,

    /// whether replace '\n' with '\\n', default true.
    pub replace_newline: Option<bool>,

    cli: Option<CliConfig>,

    /// raw-value display options, independent of storage/data settings.
    pub encoding: Option<EncodingConfig>,
}

/// load configration
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CliConfig {
    /// Show rows affected
    show_affected: Option<bool>,

    /// progress
    pub progress_color: Option<String>,

    /// Show progress [bar] when executing queries.
    pub show_progress: Option<bool>,

    // 输出格式化

}

impl Default for ConfigLoad {
    fn default() -> Self {
        ConfigLoad {
            version: 0,
            api_key: "".to_string(),
            storage_path: None,
            data_dir: None,
            storage_engine: Some(StorageEngine::default()),
            prompt: Some(DEFAULT_PROMPT.to_string()),
            show_stats: Some(false),
            auto_append_part_cmd: Some(false),
            auto_append_part_cmd_symbol: Some(';'),
            multi_line: Some(true),
            replace_newline: Some(true),
            cli: Some(CliConfig::default()),
            encoding: Some(EncodingConfig::default()),
        }
    }
}

impl ConfigLoad {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        confy::load_path(path).map_err(|e| anyhow!("failed to load config {}: {}", path, e))
    }

    pub fn is_show_affected(&self) -> bool {
        match self.cli.as_ref() {
            None => {
                false
            }
            Some(c) => {
                if c.is_show_affected().is_none() {
                    false
                } else {
                    c.is_show_affected().unwrap().clone()
                }
            }
        }
    }

    /// load config path
    pub fn get_storage_path(&self) -> PathBuf {
        if self.storage_path.is_none() {
            PathBuf::from(DEFAULT_STORAGE_PATH)
        } else {
            self.storage_path.as_ref().unwrap().clone()
        }
    }

    /// directory the selected storage engine persists to
    pub fn get_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| self.get_storage_path().join(DEFAULT_DB_NAME))
    }

    pub fn get_storage_engine(&self) -> StorageEngine {
        self.storage_engine.unwrap_or_default()
    }

    pub fn set_storage_engine(&mut self, engine: StorageEngine) {
        self.storage_engine = Some(engine);
    }

    /// fix part cmd options. default false
    pub fn get_auto_append_part_cmd(&self) -> bool {
        if self.auto_append_part_cmd.is_none() {
            false
        } else {
            self.auto_append_part_cmd.as_ref().unwrap().clone()
        }
    }

    /// Division symbol
    pub fn get_auto_append_part_cmd_symbol(&self) -> char {
        if self.auto_append_part_cmd_symbol.is_none() {
            // SemiColon ==>  ;
            ';'
        } else {
            self.auto_append_part_cmd_symbol.as_ref().unwrap().clone()
        }
    }

    pub fn get_encoding_config(&self) -> EncodingConfig {
        self.encoding.clone().unwrap_or_default()
    }

    pub fn set_encoding_config(&mut self, config: EncodingConfig) {
        self.encoding = Some(config);
    }

    pub fn get_default_encoding_format(&self) -> anyhow::Result<EncodingFormat> {
        self.get_encoding_config().get_default_format()
    }

    pub fn set_default_encoding_format(&mut self, format: EncodingFormat) {
        let mut encoding = self.get_encoding_config();
        encoding.set_default_format(format);
        self.encoding = Some(encoding);
    }

    pub fn is_auto_detect_enabled(&self) -> bool {
        self.get_encoding_config().auto_detect
    }

    pub fn set_auto_detect(&mut self, enabled: bool) {
        let mut encoding = self.get_encoding_config();
        encoding.auto_detect = enabled;
        self.encoding = Some(encoding);
    }

    pub fn get_batch_size(&self) -> usize {
        self.get_encoding_config().batch_size
    }

    pub fn set_batch_size(&mut self, size: usize) -> anyhow::Result<()> {
        if size == 0 || size > 10000 {
            return Err(anyhow!("batch_size must be between 1 and 10000, got {}", size));
        }
        let mut encoding = self.get_encoding_config();
        encoding.batch_size = size;
        self.encoding = Some(encoding);
        Ok(())
    }

    pub fn validate_encoding_config(&self) -> anyhow::Result<()> {
        self.get_encoding_config().validate()
    }

    /// change cmd:
    /// show_progress、show_stats、show_affected、auto_append_part_cmd、auto_append_part_cmd_symbol、multi_line、replace_newline、
    /// default_encoding_format、auto_detect、batch_size、storage_engine
    pub fn inject_cmd(&mut self, cmd_name: &str, cmd_value: &str) -> anyhow::Result<()> {
        match cmd_name {
            // cli
            "show_progress" => {
                self.set_show_progress(cmd_value.parse()?);
            },
            "show_affected" => {
                self.set_show_affected(cmd_value.parse()?);
            },
            "show_stats" => self.show_stats = Some(cmd_value.parse()?),
            "auto_append_part_cmd" => self.auto_append_part_cmd = Some(cmd_value.parse()?),
            "auto_append_part_cmd_symbol" => self.auto_append_part_cmd_symbol = Some(cmd_value.parse()?),
            "multi_line" => self.multi_line = Some(cmd_value.parse()?),
            "replace_newline" => self.replace_newline = Some(cmd_value.parse()?),
            "default_encoding_format" => {
                let format: EncodingFormat = cmd_value.parse().map_err(|e: sqlkv::textfmt::EncodingError| anyhow!(e.to_string()))?;
                self.set_default_encoding_format(format);
            }
            "auto_detect" => self.set_auto_detect(cmd_value.parse()?),
            "batch_size" => self.set_batch_size(cmd_value.parse()?)?,
            "storage_engine" => self.set_storage_engine(cmd_value.parse()?),
            _ => return Err(anyhow!("Unknown command: {}", cmd_name)),
        }
        Ok(())
    }

    pub fn terminal_update(&mut self) {
        self.set_show_progress(true);

        self.show_stats = Some(true);
    }

    pub fn fix_settings(&mut self) {
        if self.storage_path.is_none() {
            self.storage_path = Some(PathBuf::from(DEFAULT_STORAGE_PATH));
        } else {
            let config_path = self.storage_path.as_ref().unwrap().join(DEFAULT_DB_NAME);
            self.storage_path = Some(config_path);
        }
    }

    fn set_show_progress(&mut self, v: bool) {
        match self.cli.as_mut() {
            None => {
                let mut cli = CliConfig::default();
                cli.set_show_progress(v);
                self.cli = Some(cli);
            }
            Some(c) => {
                c.set_show_progress(v);
            }
        }
    }

    fn set_show_affected(&mut self, v: bool) {
        match self.cli.as_mut() {
            None => {
                let mut cli = CliConfig::default();
                cli.set_show_affected(v);
                self.cli = Some(cli);
            }
            Some(c) => {
                c.set_show_affected(v);
            }
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            show_affected: Some(false),
            progress_color: None,
            show_progress: Some(false),
        }
    }
}

impl CliConfig {
    pub fn is_show_affected(&self) -> Option<&bool> {
        self.show_affected.as_ref()
    }

    pub fn set_show_affected(&mut self, show_affected: bool) {
        self.show_affected = Some(show_affected);
    }

    pub fn set_show_progress(&mut self, show_progress: bool) {
        self.show_progress = Some(show_progress);
    }
}
