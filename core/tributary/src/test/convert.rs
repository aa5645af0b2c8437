use std::fs;
use std::path::{Path, PathBuf};

use crate::convert::{validate_generated, Diagnostics, Severity, ValidateOptions};

/// Extension of the files that contain the expected diagnostics.
pub const DIAGS_SUFFIX: &str = ".diags";
/// Extension of the files that contain the expected configuration.
pub const CONFIG_SUFFIX: &str = ".toml";

/// Tests a converter on every `*{source_suffix}` file of `dir`.
///
/// Sub-directories are not visited. For each source file `name{source_suffix}`:
/// 1. the converter is called on the content of the file, with `extra_args`;
/// 2. the `Info` diagnostics are removed from its result;
/// 3. if `name.diags` exists, the remaining diagnostics must match its lines, in order
///    (empty lines are ignored, `\n` is replaced by a newline);
/// 4. if `name.toml` exists and is not empty, the generated configuration must be equal
///    to its content (line endings are normalized). If `validate` is set, the generated
///    configuration is then loaded with [`validate_generated`].
///
/// Returns the number of source files that have been tested.
///
/// # Panics
/// Panics if an expectation is not met, or if a source file has neither a `.diags`
/// nor a `.toml` file.
pub fn test_directory<F>(
    dir: impl AsRef<Path>,
    source_suffix: &str,
    validate: Option<&ValidateOptions>,
    extra_args: &[String],
    convert: F,
) -> usize
where
    F: Fn(&[u8], &[String]) -> (Vec<u8>, Diagnostics),
{
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).unwrap_or_else(|e| panic!("cannot list {}: {e}", dir.display()));
    let mut sources: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && file_name(path).ends_with(source_suffix))
        .collect();
    sources.sort();

    for source in &sources {
        log::info!("testing conversion of {}", source.display());
        test_file(source, source_suffix, validate, extra_args, &convert);
    }
    sources.len()
}

fn test_file<F>(source: &Path, source_suffix: &str, validate: Option<&ValidateOptions>, extra_args: &[String], convert: &F)
where
    F: Fn(&[u8], &[String]) -> (Vec<u8>, Diagnostics),
{
    let name = file_name(source);
    let stem = &name[..name.len() - source_suffix.len()];
    let diags_file = source.with_file_name(format!("{stem}{DIAGS_SUFFIX}"));
    let config_file = source.with_file_name(format!("{stem}{CONFIG_SUFFIX}"));
    if !diags_file.exists() && !config_file.exists() {
        panic!(
            "no expected diags or config for {} - missing test expectations?",
            source.display()
        );
    }

    let input = fs::read(source).unwrap_or_else(|e| panic!("cannot read {}: {e}", source.display()));
    let (output, mut diags) = convert(&input, extra_args);
    // Info diagnostics are too noisy to be part of the expectations
    diags.remove_by_severity(Severity::Info);

    let expected_diags = read_expected_diags(&diags_file);
    let actual_diags: Vec<String> = diags.iter().map(ToString::to_string).collect();
    assert_eq!(
        expected_diags,
        actual_diags,
        "unexpected diagnostics for {}, actual diagnostics:\n{diags}",
        source.display()
    );

    let Some(expected_config) = read_expected_config(&config_file) else {
        return;
    };
    let actual_config = normalize_line_endings(&String::from_utf8_lossy(&output));
    assert_eq!(
        expected_config,
        actual_config,
        "unexpected output for {}, actual output:\n{actual_config}",
        source.display()
    );
    if let Some(options) = validate {
        if let Err(e) = validate_generated(&output, options) {
            panic!(
                "failed to load the generated config of {}: {e}\n{actual_config}",
                source.display()
            );
        }
    }
}

fn read_expected_diags(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    let content = fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    content
        .lines()
        // some messages contain newlines, they are escaped in the file
        .map(|line| line.replace("\\n", "\n"))
        .filter(|line| !line.is_empty())
        .collect()
}

fn read_expected_config(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    let content = fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    Some(normalize_line_endings(&content)).filter(|c| !c.is_empty())
}

fn normalize_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n")
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}
