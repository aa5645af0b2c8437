use std::borrow::Cow;
use std::env::VarError;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Reads the agent config file, with fallback content, env substitution and overrides.
///
/// ```no_run
/// use tributary::config::Loader;
///
/// let table = Loader::parse_file("tributary.toml")
///     .substitute_env_variables(true)
///     .or_default("[runtime]\n", true)
///     .load()?;
/// # Ok::<(), tributary::config::ConfigFileError>(())
/// ```
pub struct Loader {
    file: PathBuf,
    default_content: Option<String>,
    save_default: bool,
    overrides: Option<toml::Table>,
    substitute_env: bool,
}

#[derive(Error, Debug)]
#[error("could not load config from '{}'", .config_file.display())]
pub struct ConfigFileError {
    pub config_file: PathBuf,
    #[source]
    pub cause: ConfigFileErrorCause,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigFileErrorCause {
    #[error("the file cannot be read")]
    Read(#[source] io::Error),
    #[error("the default content cannot be saved")]
    DefaultWrite(#[source] io::Error),
    #[error("bad variable reference")]
    Substitution(#[from] InvalidSubstitutionError),
    #[error("the content is not valid TOML")]
    InvalidToml(#[from] toml::de::Error),
}

/// A `${NAME}` reference that [`substitute_env`] cannot resolve.
#[derive(Error, PartialEq, Debug)]
pub enum InvalidSubstitutionError {
    #[error("${{{0}}} is not set")]
    Missing(String),
    #[error("${{{0}}} is set but is not UTF-8")]
    InvalidValue(String),
    /// Names are made of ASCII letters, digits and `_`.
    #[error("`{0}` cannot be used as a variable name")]
    InvalidName(String),
    #[error("unterminated `${{`, expected `${{NAME}}`")]
    WrongSyntax,
}

impl Loader {
    /// Nothing is read before [`load`](Self::load).
    pub fn parse_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: path.into(),
            default_content: None,
            save_default: false,
            overrides: None,
            substitute_env: false,
        }
    }

    /// Content used when the file is missing, written to the file if `save` is true.
    pub fn or_default(mut self, content: impl Into<String>, save: bool) -> Self {
        self.default_content = Some(content.into());
        self.save_default = save;
        self
    }

    /// Adds a table that is [merged](merge_override) over the file content.
    /// A later override wins over an earlier one.
    pub fn with_override(mut self, table: toml::Table) -> Self {
        if let Some(existing) = &mut self.overrides {
            merge_override(existing, table);
        } else {
            self.overrides = Some(table);
        }
        self
    }

    /// Runs [`substitute_env`] on the raw text, before TOML parsing.
    pub fn substitute_env_variables(mut self, enabled: bool) -> Self {
        self.substitute_env = enabled;
        self
    }

    pub fn load(mut self) -> Result<toml::Table, ConfigFileError> {
        self.load_impl().map_err(|cause| ConfigFileError {
            config_file: self.file,
            cause,
        })
    }

    fn load_impl(&mut self) -> Result<toml::Table, ConfigFileErrorCause> {
        let content = self.read_or_default()?;
        let content = if self.substitute_env {
            substitute_env(&content)?
        } else {
            Cow::Borrowed(content.as_str())
        };
        let mut table = toml::Table::from_str(&content)?;
        if let Some(overrides) = self.overrides.take() {
            merge_override(&mut table, overrides);
        }
        Ok(table)
    }

    fn read_or_default(&mut self) -> Result<String, ConfigFileErrorCause> {
        let e = match std::fs::read_to_string(&self.file) {
            Ok(content) => return Ok(content),
            Err(e) => e,
        };
        match self.default_content.take() {
            Some(default) if e.kind() == io::ErrorKind::NotFound => {
                if self.save_default {
                    log::info!("Writing default configuration to {}", self.file.display());
                    std::fs::write(&self.file, &default).map_err(ConfigFileErrorCause::DefaultWrite)?;
                }
                Ok(default)
            }
            _ => Err(ConfigFileErrorCause::Read(e)),
        }
    }
}

/// Replaces every `${VAR_NAME}` by the value of the environment variable `VAR_NAME`.
///
/// `\${NAME}` is kept as the literal text `${NAME}`.
pub fn substitute_env(input: &str) -> Result<Cow<'_, str>, InvalidSubstitutionError> {
    substitute_with(input, |name| std::env::var(name))
}

fn substitute_with(
    input: &str,
    lookup: impl Fn(&str) -> Result<String, VarError>,
) -> Result<Cow<'_, str>, InvalidSubstitutionError> {
    if !input.contains("${") {
        return Ok(Cow::Borrowed(input));
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        if start > 0 && rest.as_bytes()[start - 1] == b'\\' {
            // escaped: drop the backslash, keep the pattern as is
            out.push_str(&rest[..start - 1]);
            out.push_str("${");
            rest = &rest[start + 2..];
            continue;
        }
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(InvalidSubstitutionError::WrongSyntax)?;
        let name = &after[..end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(InvalidSubstitutionError::InvalidName(name.to_owned()));
        }
        match lookup(name) {
            Ok(value) => out.push_str(&value),
            Err(VarError::NotPresent) => return Err(InvalidSubstitutionError::Missing(name.to_owned())),
            Err(VarError::NotUnicode(_)) => return Err(InvalidSubstitutionError::InvalidValue(name.to_owned())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

/// Writes every entry of `overrides` into `base`.
///
/// Tables present on both sides are merged recursively. Any other value, arrays included, is replaced.
pub fn merge_override(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => merge_override(existing, nested),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::env::VarError;
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::{merge_override, substitute_with, ConfigFileErrorCause, InvalidSubstitutionError, Loader};

    fn lookup(name: &str) -> Result<String, VarError> {
        match name {
            "NODE" => Ok(String::from("node-1")),
            "EMPTY" => Ok(String::new()),
            _ => Err(VarError::NotPresent),
        }
    }

    #[test]
    fn no_substitution() {
        let input = "a = 1\n[table]\nlist = ['$', '{}']";
        assert_eq!(substitute_with(input, lookup).unwrap(), Cow::Borrowed(input));
    }

    #[test]
    fn substitution() {
        assert_eq!(substitute_with("${NODE}", lookup).unwrap(), "node-1");
        assert_eq!(
            substitute_with("name = \"${NODE}-${NODE}\"${EMPTY}", lookup).unwrap(),
            "name = \"node-1-node-1\""
        );
    }

    #[test]
    fn escaped() {
        assert_eq!(substitute_with(r"\${NODE}", lookup).unwrap(), "${NODE}");
        assert_eq!(substitute_with(r" \${NODE} ${NODE}", lookup).unwrap(), " ${NODE} node-1");
    }

    #[test]
    fn errors() {
        assert_eq!(substitute_with("abc${", lookup), Err(InvalidSubstitutionError::WrongSyntax));
        assert_eq!(
            substitute_with("k = true\n${UNCLOSED\nb = 1", lookup),
            Err(InvalidSubstitutionError::WrongSyntax)
        );
        assert_eq!(
            substitute_with("${MISSING}", lookup),
            Err(InvalidSubstitutionError::Missing(String::from("MISSING")))
        );
        assert_eq!(
            substitute_with("${BAD NAME}", lookup),
            Err(InvalidSubstitutionError::InvalidName(String::from("BAD NAME")))
        );
    }

    #[test]
    fn deep_merge() {
        let mut original: toml::Table = toml::from_str(
            r#"
            a = 1
            [runtime]
            min_stability = "stable"
            shutdown_grace_period = "5s"
            "#,
        )
        .unwrap();
        let overrider: toml::Table = toml::from_str(
            r#"
            b = [1, 2]
            [runtime]
            min_stability = "beta"
            "#,
        )
        .unwrap();
        merge_override(&mut original, overrider);
        let expected: toml::Table = toml::from_str(
            r#"
            a = 1
            b = [1, 2]
            [runtime]
            min_stability = "beta"
            shutdown_grace_period = "5s"
            "#,
        )
        .unwrap();
        assert_eq!(original, expected);
    }

    #[test]
    fn load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\nmin_stability = \"beta\"").unwrap();
        let table = Loader::parse_file(file.path())
            .with_override(toml::from_str("[runtime]\ncontrol_channel_size = 8").unwrap())
            .load()
            .unwrap();
        let runtime = table["runtime"].as_table().unwrap();
        assert_eq!(runtime["min_stability"].as_str(), Some("beta"));
        assert_eq!(runtime["control_channel_size"].as_integer(), Some(8));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let err = Loader::parse_file(&path).load().unwrap_err();
        assert!(matches!(err.cause, ConfigFileErrorCause::Read(_)));

        let table = Loader::parse_file(&path).or_default("x = 1", true).load().unwrap();
        assert_eq!(table["x"].as_integer(), Some(1));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x = 1");
    }

    #[test]
    #[serial]
    fn load_file_with_env() {
        const VAR: &str = "TRIBUTARY_LOADER_TEST_LABEL";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "label = \"${{{VAR}}}\"").unwrap();

        // SAFETY: serial test, no other thread reads the environment
        unsafe { std::env::set_var(VAR, "edge") };
        let table = Loader::parse_file(file.path()).substitute_env_variables(true).load().unwrap();
        assert_eq!(table["label"].as_str(), Some("edge"));

        // without substitution, the text is kept as is
        let table = Loader::parse_file(file.path()).load().unwrap();
        assert_eq!(table["label"].as_str(), Some("${TRIBUTARY_LOADER_TEST_LABEL}"));

        unsafe { std::env::remove_var(VAR) };
        let err = Loader::parse_file(file.path())
            .substitute_env_variables(true)
            .load()
            .unwrap_err();
        assert!(matches!(
            err.cause,
            ConfigFileErrorCause::Substitution(InvalidSubstitutionError::Missing(_))
        ));
    }
}
