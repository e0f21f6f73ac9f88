//! Persistent volume handling for container deployments.
//!
//! State that has to survive a redeploy lives in the data directory. The
//! application directory only holds links into it.

use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::info;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// Files kept on the volume.
pub const PERSISTED_FILES: &[&str] = &[
    "token.json",
    "tiktok_cookies.txt",
    "client_secrets.json",
    "analytics.db",
    "voice_history.json",
    "settings.json",
];

/// Directories kept on the volume.
pub const PERSISTED_DIRS: &[&str] = &["fonts", "output", "audio"];

/// Environment variables carrying base64 secrets, and the file each one becomes.
pub const ENCODED_SECRETS: &[(&str, &str)] = &[
    ("TOKEN_JSON_B64", "token.json"),
    ("TIKTOK_COOKIES_B64", "tiktok_cookies.txt"),
    ("CLIENT_SECRETS_B64", "client_secrets.json"),
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub seeded: usize,
    pub linked: usize,
    pub decoded: usize,
}

pub struct Volume {
    app_dir: PathBuf,
    data_dir: PathBuf,
}

impl Volume {
    pub fn new(app_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self { app_dir, data_dir }
    }

    fn names() -> impl Iterator<Item = &'static str> {
        PERSISTED_FILES.iter().chain(PERSISTED_DIRS).copied()
    }

    /// First deploy: copies bundled files and directories onto the empty volume.
    pub fn seed(&self) -> Result<usize> {
        std::fs::create_dir_all(&self.data_dir)?;
        let mut seeded = 0;
        for name in Self::names() {
            let bundled = self.app_dir.join(name);
            let persisted = self.data_dir.join(name);
            if persisted.exists() || is_symlink(&bundled) || !bundled.exists() {
                continue;
            }
            if bundled.is_dir() {
                copy_dir(&bundled, &persisted)?;
            } else {
                std::fs::copy(&bundled, &persisted)?;
            }
            info!("Seeded {} to volume", name);
            seeded += 1;
        }
        for dir in PERSISTED_DIRS {
            std::fs::create_dir_all(self.data_dir.join(dir))?;
        }
        Ok(seeded)
    }

    /// Every start: replaces in-app paths with links to the volume copies.
    pub fn link(&self) -> Result<usize> {
        let mut linked = 0;
        for name in Self::names() {
            let local = self.app_dir.join(name);
            let target = self.data_dir.join(name);
            if std::fs::read_link(&local).map(|t| t == target).unwrap_or(false) {
                continue;
            }
            if is_symlink(&local) || local.is_file() {
                std::fs::remove_file(&local)?;
            } else if local.is_dir() {
                std::fs::remove_dir_all(&local)?;
            }
            symlink(&target, &local)?;
            linked += 1;
        }
        info!("Linked {} paths to {}", linked, self.data_dir.display());
        Ok(linked)
    }

    /// Writes base64 secrets from the environment unless the volume already has them.
    pub fn decode_secrets<F>(&self, lookup: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut decoded = 0;
        for (var, file) in ENCODED_SECRETS {
            let dest = self.data_dir.join(file);
            if dest.exists() {
                continue;
            }
            let Some(encoded) = lookup(*var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| PipelineError::EnvError(format!("{} is not valid base64: {}", var, e)))?;
            std::fs::write(&dest, bytes)?;
            info!("Decoded {} into {}", var, dest.display());
            decoded += 1;
        }
        Ok(decoded)
    }

    pub fn bootstrap<F>(&self, lookup: F) -> Result<BootstrapReport>
    where
        F: Fn(&str) -> Option<String>,
    {
        let seeded = self.seed()?;
        let linked = self.link()?;
        let decoded = self.decode_secrets(lookup)?;
        Ok(BootstrapReport {
            seeded,
            linked,
            decoded,
        })
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| PipelineError::IoError(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    tracing::warn!("Symlinks unsupported here; {} will not follow {}", link.display(), target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn volume() -> (tempfile::TempDir, Volume) {
        let root = tempfile::tempdir().unwrap();
        let app = root.path().join("app");
        let data = root.path().join("data");
        std::fs::create_dir_all(&app).unwrap();
        let volume = Volume::new(app, data);
        (root, volume)
    }

    #[test]
    fn seeds_bundled_files_once() {
        let (_root, vol) = volume();
        std::fs::write(vol.app_dir.join("settings.json"), r#"{"max_videos_per_day": 2}"#).unwrap();
        std::fs::create_dir_all(vol.app_dir.join("fonts/extra")).unwrap();
        std::fs::write(vol.app_dir.join("fonts/extra/Anton.ttf"), b"font").unwrap();

        assert_eq!(vol.seed().unwrap(), 2);
        assert!(vol.data_dir.join("fonts/extra/Anton.ttf").exists());
        assert!(vol.data_dir.join("output").is_dir());

        std::fs::write(vol.data_dir.join("settings.json"), "{}").unwrap();
        assert_eq!(vol.seed().unwrap(), 0);
        assert_eq!(std::fs::read_to_string(vol.data_dir.join("settings.json")).unwrap(), "{}");
    }

    #[cfg(unix)]
    #[test]
    fn links_point_into_the_volume() {
        let (_root, vol) = volume();
        std::fs::write(vol.app_dir.join("voice_history.json"), "{}").unwrap();
        vol.seed().unwrap();

        let linked = vol.link().unwrap();
        assert_eq!(linked, PERSISTED_FILES.len() + PERSISTED_DIRS.len());
        assert_eq!(
            std::fs::read_link(vol.app_dir.join("output")).unwrap(),
            vol.data_dir.join("output")
        );

        std::fs::write(vol.app_dir.join("voice_history.json"), r#"{"deep_male":"Liam"}"#).unwrap();
        assert!(std::fs::read_to_string(vol.data_dir.join("voice_history.json"))
            .unwrap()
            .contains("Liam"));
        assert_eq!(vol.link().unwrap(), 0);
    }

    #[test]
    fn decodes_secrets_that_are_missing() {
        let (_root, vol) = volume();
        std::fs::create_dir_all(&vol.data_dir).unwrap();
        std::fs::write(vol.data_dir.join("client_secrets.json"), "existing").unwrap();

        let env: HashMap<&str, String> = HashMap::from([
            ("TOKEN_JSON_B64", base64::engine::general_purpose::STANDARD.encode(r#"{"token":"t"}"#)),
            ("CLIENT_SECRETS_B64", base64::engine::general_purpose::STANDARD.encode("new")),
        ]);
        let decoded = vol.decode_secrets(|k| env.get(k).cloned()).unwrap();

        assert_eq!(decoded, 1);
        assert_eq!(
            std::fs::read_to_string(vol.data_dir.join("token.json")).unwrap(),
            r#"{"token":"t"}"#
        );
        assert_eq!(std::fs::read_to_string(vol.data_dir.join("client_secrets.json")).unwrap(), "existing");
        assert!(!vol.data_dir.join("tiktok_cookies.txt").exists());
    }

    #[test]
    fn bad_base64_is_an_error() {
        let (_root, vol) = volume();
        std::fs::create_dir_all(&vol.data_dir).unwrap();
        let result = vol.decode_secrets(|k| (k == "TOKEN_JSON_B64").then(|| "%%%".to_string()));
        assert!(matches!(result, Err(PipelineError::EnvError(_))));
    }
}
