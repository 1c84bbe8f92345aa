use std::time::Duration;
use std::{fs, io};

use anyhow::{Context, Result, anyhow, ensure};
use byte_unit::Byte;
use camino::{Utf8Path, Utf8PathBuf};
use serde_derive::Deserialize;

/// How many chunks' worth of appended bytes we let pile up before a flush.
pub const DEFAULT_FLUSH_MULTIPLIER: u32 = 7500;

/// How long we give cleanup to delete a half-written file.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Used when a transfer doesn't ask for a block size of its own.
pub const DEFAULT_BLOCK_SIZE: u64 = 8 * 1024 * 1024;

#[inline]
fn defmultiplier() -> u32 {
    DEFAULT_FLUSH_MULTIPLIER
}

#[inline]
fn deftimeout() -> u64 {
    DEFAULT_CLEANUP_TIMEOUT.as_secs()
}

#[inline]
fn defblocksize() -> Byte {
    Byte::from_u64(DEFAULT_BLOCK_SIZE)
}

/// Sender policy, fixed for the life of each sender.
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "defmultiplier")]
    pub flush_multiplier: u32,
    #[serde(default = "deftimeout")]
    pub cleanup_timeout_secs: u64,
    #[serde(default = "defblocksize")]
    pub default_block_size: Byte,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            flush_multiplier: DEFAULT_FLUSH_MULTIPLIER,
            cleanup_timeout_secs: deftimeout(),
            default_block_size: defblocksize(),
        }
    }
}

impl SenderConfig {
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    pub fn fallback_block_size(&self) -> Result<u32> {
        let b = self.default_block_size.as_u64();
        u32::try_from(b).with_context(|| format!("Default block size {b} is too large"))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.flush_multiplier > 0, "Flush multiplier must be positive");
        ensure!(
            self.cleanup_timeout_secs > 0,
            "Cleanup timeout must be positive"
        );
        ensure!(
            self.fallback_block_size()? > 0,
            "Default block size must be positive"
        );
        Ok(())
    }
}

pub fn from_str(s: &str) -> Result<SenderConfig> {
    let conf: SenderConfig = toml::from_str(s)?;
    conf.validate()?;
    Ok(conf)
}

/// Load `~/.config/hnsend.toml`, or defaults if there isn't one.
pub fn load() -> Result<SenderConfig> {
    let mut confpath: Utf8PathBuf = home::home_dir()
        .ok_or_else(|| anyhow!("Can't find home directory"))?
        .try_into()
        .context("Home directory isn't UTF-8")?;
    confpath.extend([".config", "hnsend.toml"]);
    load_from(&confpath)
}

pub fn load_from(confpath: &Utf8Path) -> Result<SenderConfig> {
    let s = match fs::read_to_string(confpath) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SenderConfig::default()),
        found => found,
    }
    .with_context(|| format!("Couldn't open {confpath}"))?;
    from_str(&s).with_context(|| format!("Couldn't parse {confpath}"))
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::Write;

    #[test]
    fn defaults() -> Result<()> {
        let c = from_str("")?;
        assert_eq!(c.flush_multiplier, 7500);
        assert_eq!(c.cleanup_timeout(), Duration::from_secs(120));
        assert_eq!(c.fallback_block_size()?, 8 * 1024 * 1024);
        Ok(())
    }

    #[test]
    fn overrides() -> Result<()> {
        let c = from_str(
            r#"
            flush_multiplier = 3
            cleanup_timeout_secs = 5
            default_block_size = "4 MiB"
            "#,
        )?;
        assert_eq!(c.flush_multiplier, 3);
        assert_eq!(c.cleanup_timeout(), Duration::from_secs(5));
        assert_eq!(c.fallback_block_size()?, 4 * 1024 * 1024);
        Ok(())
    }

    #[test]
    fn nonsense() {
        assert!(from_str("flush_multiplier = 0").is_err());
        assert!(from_str("cleanup_timeout_secs = 0").is_err());
        assert!(from_str("default_block_size = \"8 GiB\"").is_err());
        assert!(from_str("flush_multiplier = \"lots\"").is_err());
    }

    #[test]
    fn missing_file_is_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = Utf8PathBuf::try_from(dir.path().join("nope.toml"))?;
        let c = load_from(&p)?;
        assert_eq!(c.flush_multiplier, DEFAULT_FLUSH_MULTIPLIER);
        Ok(())
    }

    #[test]
    fn from_file() -> Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        writeln!(f, "flush_multiplier = 2")?;
        let p = Utf8Path::from_path(f.path()).ok_or_else(|| anyhow!("temp path isn't UTF-8"))?;
        let c = load_from(p)?;
        assert_eq!(c.flush_multiplier, 2);
        assert_eq!(c.cleanup_timeout(), DEFAULT_CLEANUP_TIMEOUT);
        Ok(())
    }
}
