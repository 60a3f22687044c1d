use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;

use crate::config::ResolvedConfig;

const SCENARIO_GLOBS: [&str; 2] = ["*.scenario.yml", "*.scenario.yaml"];

fn scenario_globs() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in SCENARIO_GLOBS {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {pattern}"))?);
    }
    builder.build().context("failed to build scenario globs")
}

/// Discover scenario files from the given paths, respecting .gitignore and
/// the config's exclude patterns.
pub fn discover_scenarios(paths: &[PathBuf], config: &ResolvedConfig) -> Result<Vec<PathBuf>> {
    let globs = scenario_globs()?;
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            // Direct file paths bypass name filtering
            files.push(path.clone());
        } else if path.is_dir() {
            files.extend(walk_directory(path, config, &globs)?);
        } else {
            anyhow::bail!("path does not exist: {}", path.display());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn walk_directory(dir: &Path, config: &ResolvedConfig, globs: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut builder = WalkBuilder::new(dir);
    builder.hidden(true).git_ignore(true).git_global(true);

    let excludes = config.global_excludes();
    if !excludes.is_empty() {
        let mut overrides = OverrideBuilder::new(dir);
        for pattern in excludes {
            overrides
                .add(&format!("!{pattern}"))
                .with_context(|| format!("invalid exclude pattern: {pattern}"))?;
        }
        let overrides = overrides.build().context("failed to build overrides")?;
        builder.overrides(overrides);
    }

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry.context("error walking directory")?;
        let path = entry.path();
        let is_scenario = path.file_name().is_some_and(|name| globs.is_match(name));
        if is_scenario && path.is_file() {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use std::fs;

    fn defaults() -> ResolvedConfig {
        load_config(Some(Path::new("/nonexistent"))).unwrap()
    }

    #[test]
    fn discovers_scenario_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.scenario.yml"), "").unwrap();
        fs::write(dir.path().join("b.scenario.yaml"), "").unwrap();
        fs::write(dir.path().join("c.yml"), "").unwrap();

        let files = discover_scenarios(&[dir.path().to_path_buf()], &defaults()).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.scenario.yml", "b.scenario.yaml"]);
    }

    #[test]
    fn direct_file_bypasses_name_filter() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("calc.yml");
        fs::write(&plain, "").unwrap();

        let files = discover_scenarios(&[plain.clone()], &defaults()).unwrap();
        assert_eq!(files, vec![plain]);
    }

    #[test]
    fn nonexistent_path_errors() {
        let result = discover_scenarios(&[PathBuf::from("/no/such/path")], &defaults());
        assert!(result.is_err());
    }

    #[test]
    fn nested_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("slow");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join("top.scenario.yml"), "").unwrap();
        fs::write(sub.join("nested.scenario.yml"), "").unwrap();

        let files = discover_scenarios(&[dir.path().to_path_buf()], &defaults()).unwrap();
        assert_eq!(files.len(), 2);

        let config_path = dir.path().join(".mockwire.yml");
        fs::write(&config_path, "exclude:\n  - \"slow/**\"\n").unwrap();
        let config = load_config(Some(&config_path)).unwrap();
        let files = discover_scenarios(&[dir.path().to_path_buf()], &config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("top.scenario.yml"));
    }
}
