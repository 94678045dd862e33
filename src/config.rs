use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing value for {flag}")]
    MissingValue { flag: String },
    #[error("Invalid value {value:?} for {flag}: expected a positive integer")]
    InvalidValue { flag: String, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub input: PathBuf,
    /// Derived from the input name and frame size when not given.
    pub output: Option<PathBuf>,
    pub runs: u32,
    pub block_size: u32,
    pub test_mode: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            width: 2048,
            height: 2048,
            samples: 1,
            input: PathBuf::from("Scenes/cornell.txt"),
            output: None,
            runs: 1,
            block_size: 512,
            test_mode: false,
        }
    }
}

impl RenderConfig {
    /// `Outputs/<input file name>_<W>x<H>x<A>.bmp` unless `-output` was given.
    pub fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let scene_name = self
            .input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".to_owned());
        Path::new("Outputs").join(format!(
            "{}_{}x{}x{}.bmp",
            scene_name, self.width, self.height, self.samples
        ))
    }
}

fn next_value<'a>(flag: &str, args: &mut impl Iterator<Item = &'a str>) -> Result<&'a str, ConfigError> {
    args.next().ok_or_else(|| ConfigError::MissingValue { flag: flag.to_owned() })
}

fn next_positive<'a>(flag: &str, args: &mut impl Iterator<Item = &'a str>) -> Result<u32, ConfigError> {
    let value = next_value(flag, args)?;
    match value.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            flag: flag.to_owned(),
            value: value.to_owned(),
        }),
    }
}

/// Parses the arguments after the program name.
pub fn parse_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<RenderConfig, ConfigError> {
    let mut config = RenderConfig::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg {
            "-size" => {
                config.width = next_positive(arg, &mut args)?;
                config.height = next_positive(arg, &mut args)?;
            }
            "-samples" => config.samples = next_positive(arg, &mut args)?,
            "-input" => config.input = PathBuf::from(next_value(arg, &mut args)?),
            "-output" => config.output = Some(PathBuf::from(next_value(arg, &mut args)?)),
            "-runs" => config.runs = next_positive(arg, &mut args)?,
            "-blockSize" => config.block_size = next_positive(arg, &mut args)?,
            "-testMode" => config.test_mode = true,
            unknown => log::warn!("unknown argument: {unknown}"),
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_gives_defaults() {
        let config = parse_args(Vec::new()).unwrap();
        assert_eq!(config, RenderConfig::default());
        assert_eq!(
            config.output_path(),
            PathBuf::from("Outputs/cornell.txt_2048x2048x1.bmp")
        );
    }

    #[test]
    fn all_flags_are_read() {
        let config = parse_args([
            "-size", "640", "480", "-samples", "4", "-input", "Scenes/glass.txt", "-runs", "3",
            "-blockSize", "128", "-testMode",
        ])
        .unwrap();
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.samples, 4);
        assert_eq!(config.runs, 3);
        assert_eq!(config.block_size, 128);
        assert!(config.test_mode);
        assert_eq!(
            config.output_path(),
            PathBuf::from("Outputs/glass.txt_640x480x4.bmp")
        );
    }

    #[test]
    fn explicit_output_wins() {
        let config = parse_args(["-output", "out.bmp", "-size", "8", "8"]).unwrap();
        assert_eq!(config.output_path(), PathBuf::from("out.bmp"));
    }

    #[test]
    fn unknown_flags_are_skipped() {
        let config = parse_args(["-fast", "-samples", "2"]).unwrap();
        assert_eq!(config.samples, 2);
    }

    #[test]
    fn missing_value_is_an_error() {
        assert_eq!(
            parse_args(["-size", "100"]),
            Err(ConfigError::MissingValue { flag: "-size".into() })
        );
        assert!(parse_args(["-input"]).is_err());
    }

    #[test]
    fn zero_and_garbage_are_rejected() {
        assert!(matches!(
            parse_args(["-blockSize", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_args(["-samples", "two"]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
