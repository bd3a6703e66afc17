use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("extension must not be empty")]
    EmptyExtension,
    #[error("source and target extensions must differ (both are {0:?})")]
    SameExtension(String),
    #[error("backup suffix {suffix:?} collides with extension {extension:?}")]
    BackupSuffixCollision { suffix: String, extension: String },
}

/// Source/target language description and every path derived from it.
///
/// Extensions are stored without the leading dot. The backup suffix is
/// appended to the full source path, so `Foo.java` backs up to `Foo.java.bak`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePair {
    source_ext: String,
    target_ext: String,
    tag: String,
    backup_suffix: String,
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self {
            source_ext: "java".to_string(),
            target_ext: "kt".to_string(),
            tag: "kotlin".to_string(),
            backup_suffix: ".bak".to_string(),
        }
    }
}

impl LanguagePair {
    pub fn new(
        source_ext: &str,
        target_ext: &str,
        tag: &str,
        backup_suffix: &str,
    ) -> Result<Self, ConfigError> {
        let source_ext = source_ext.trim_start_matches('.').to_string();
        let target_ext = target_ext.trim_start_matches('.').to_string();
        if source_ext.is_empty() || target_ext.is_empty() || backup_suffix.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if source_ext.eq_ignore_ascii_case(&target_ext) {
            return Err(ConfigError::SameExtension(source_ext));
        }
        let suffix_ext = backup_suffix.trim_start_matches('.');
        for extension in [&source_ext, &target_ext] {
            if suffix_ext.eq_ignore_ascii_case(extension) {
                return Err(ConfigError::BackupSuffixCollision {
                    suffix: backup_suffix.to_string(),
                    extension: extension.clone(),
                });
            }
        }
        Ok(Self {
            source_ext,
            target_ext,
            tag: tag.to_string(),
            backup_suffix: backup_suffix.to_string(),
        })
    }

    pub fn source_ext(&self) -> &str {
        &self.source_ext
    }

    pub fn target_ext(&self) -> &str {
        &self.target_ext
    }

    /// Language tag used by the extractor delimiters, e.g. `kotlin`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn backup_suffix(&self) -> &str {
        &self.backup_suffix
    }

    /// Human readable language name, the tag with an upper-case first letter.
    pub fn display_name(&self) -> String {
        let mut chars = self.tag.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn is_source(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.source_ext))
    }

    /// `dir/Foo.java` -> `dir/Foo.kt`
    pub fn target_path(&self, source: &Path) -> PathBuf {
        source.with_extension(&self.target_ext)
    }

    /// `dir/Foo.kt` -> `dir/Foo.java`
    pub fn source_path(&self, target: &Path) -> PathBuf {
        target.with_extension(&self.source_ext)
    }

    /// `dir/Foo.java` -> `dir/Foo.java.bak`
    pub fn backup_path(&self, source: &Path) -> PathBuf {
        let mut raw: OsString = source.as_os_str().to_owned();
        raw.push(&self.backup_suffix);
        PathBuf::from(raw)
    }

    pub fn progress_key(&self, source: &Path) -> SinkKey {
        SinkKey::new(KeyKind::Progress, self.target_path(source))
    }

    pub fn result_key(&self, source: &Path) -> SinkKey {
        SinkKey::new(KeyKind::Result, self.target_path(source))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyKind {
    Progress,
    Result,
}

/// Address of a text slot in the streaming sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkKey {
    pub kind: KeyKind,
    pub path: PathBuf,
}

impl SinkKey {
    pub fn new(kind: KeyKind, path: PathBuf) -> Self {
        Self { kind, path }
    }
}

impl fmt::Display for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.kind {
            KeyKind::Progress => "progress",
            KeyKind::Result => "result",
        };
        write!(f, "{scheme}:{}", self.path.display())
    }
}
