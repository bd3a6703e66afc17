use std::path::{Path, PathBuf};

use batchconv_core::{ConfigError, KeyKind, LanguagePair};
use pretty_assertions::assert_eq;

#[test]
fn derived_paths_for_default_pair() {
    let languages = LanguagePair::default();
    let source = Path::new("/work/src/Foo.java");

    assert!(languages.is_source(source));
    assert!(languages.is_source(Path::new("Bar.JAVA")));
    assert!(!languages.is_source(Path::new("Foo.kt")));
    assert_eq!(languages.target_path(source), PathBuf::from("/work/src/Foo.kt"));
    assert_eq!(
        languages.backup_path(source),
        PathBuf::from("/work/src/Foo.java.bak")
    );
    assert_eq!(
        languages.source_path(Path::new("/work/src/Foo.kt")),
        PathBuf::from("/work/src/Foo.java")
    );
    assert_eq!(languages.display_name(), "Kotlin");
}

#[test]
fn sink_keys_share_the_target_path() {
    let languages = LanguagePair::default();
    let progress = languages.progress_key(Path::new("a/B.java"));
    let result = languages.result_key(Path::new("a/B.java"));

    assert_eq!(progress.kind, KeyKind::Progress);
    assert_eq!(result.kind, KeyKind::Result);
    assert_eq!(progress.path, result.path);
    assert_ne!(progress, result);
    assert_eq!(progress.to_string(), format!("progress:{}", Path::new("a/B.kt").display()));
}

#[test]
fn backup_suffix_must_not_collide_with_extensions() {
    assert_eq!(
        LanguagePair::new("java", "kt", "kotlin", ".kt"),
        Err(ConfigError::BackupSuffixCollision {
            suffix: ".kt".to_string(),
            extension: "kt".to_string(),
        })
    );
    assert_eq!(
        LanguagePair::new("java", "java", "java", ".bak"),
        Err(ConfigError::SameExtension("java".to_string()))
    );
    assert_eq!(
        LanguagePair::new("", "kt", "kotlin", ".bak"),
        Err(ConfigError::EmptyExtension)
    );
}

#[test]
fn leading_dots_are_ignored() {
    let languages = LanguagePair::new(".py", ".rs", "rust", ".orig").unwrap();
    assert_eq!(languages.source_ext(), "py");
    assert_eq!(
        languages.target_path(Path::new("m.py")),
        PathBuf::from("m.rs")
    );
    assert_eq!(
        languages.backup_path(Path::new("m.py")),
        PathBuf::from("m.py.orig")
    );
}
