//! rmarshal CLI
//!
//! Command-line tool for looking inside Marshal 4.8 streams.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::{CommandFactory, Parser as ClapParser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use marshal::{CodecConfig, InspectConfig, Marshal, TypeRegistry, inspect_with_host};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(ClapParser)]
#[command(name = "rmarshal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect Marshal 4.8 streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a stream and print its value
    Inspect {
        /// File holding the stream
        input: PathBuf,

        /// How the file's contents are encoded
        #[arg(long = "input", value_enum, default_value_t = InputFormat::Raw)]
        format: InputFormat,

        /// Path to codec configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print nested values on separate lines
        #[arg(long)]
        pretty: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// Stream bytes as-is
    Raw,
    /// Hexadecimal text, whitespace ignored
    Hex,
    /// Standard base64 text, whitespace ignored
    Base64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            input,
            format,
            config,
            pretty,
        } => {
            run_inspect(&input, format, config.as_deref(), pretty);
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rmarshal", &mut io::stdout());
}

fn run_inspect(input: &Path, format: InputFormat, config_path: Option<&Path>, pretty: bool) {
    let config = match config_path {
        Some(path) => match CodecConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => CodecConfig::default(),
    };

    let raw = match std::fs::read(input) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    let bytes = match decode_input(&raw, format) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error decoding {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    debug!("decoded {} stream bytes from {}", bytes.len(), input.display());

    let inspect_config = if pretty {
        InspectConfig::pretty()
    } else {
        InspectConfig::compact()
    };

    match render(&bytes, config, &inspect_config) {
        Ok((text, warnings)) => {
            for warning in warnings {
                eprintln!("Warning: {}", warning);
            }
            println!("{}", text);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Turn file contents into stream bytes
fn decode_input(raw: &[u8], format: InputFormat) -> Result<Vec<u8>, String> {
    let text = || -> Vec<u8> {
        raw.iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect()
    };
    match format {
        InputFormat::Raw => Ok(raw.to_vec()),
        InputFormat::Hex => hex::decode(text()).map_err(|e| e.to_string()),
        InputFormat::Base64 => BASE64.decode(text()).map_err(|e| e.to_string()),
    }
}

/// Load with a permissive registry so unknown classes still display
fn render(
    bytes: &[u8],
    config: CodecConfig,
    inspect_config: &InspectConfig,
) -> Result<(String, Vec<String>), marshal::CodecError> {
    let registry = TypeRegistry::permissive();
    let loaded = Marshal::new(config).load(bytes, &registry)?;
    let text = inspect_with_host(&loaded.value, inspect_config, &registry);
    let warnings = loaded.warnings.iter().map(|w| w.to_string()).collect();
    Ok((text, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marshal::ErrorKind;

    #[test]
    fn test_decode_raw() {
        assert_eq!(decode_input(&[4, 8, b'0'], InputFormat::Raw).unwrap(), vec![4, 8, b'0']);
    }

    #[test]
    fn test_decode_hex_ignores_whitespace() {
        let bytes = decode_input(b"04 08\n30\n", InputFormat::Hex).unwrap();
        assert_eq!(bytes, vec![4, 8, b'0']);
        assert!(decode_input(b"0g", InputFormat::Hex).is_err());
    }

    #[test]
    fn test_decode_base64() {
        // [4, 8, 'T']
        let bytes = decode_input(b"BAhU\n", InputFormat::Base64).unwrap();
        assert_eq!(bytes, vec![4, 8, b'T']);
    }

    #[test]
    fn test_render_unknown_class() {
        let mut bytes = vec![4, 8, b'o', b':', 11];
        bytes.extend_from_slice(b"Widget");
        bytes.extend_from_slice(&[6, b':', 8, b'@', b'i', b'd', b'i', 12]);
        let (text, warnings) = render(&bytes, CodecConfig::default(), &InspectConfig::compact()).unwrap();
        assert_eq!(text, "#<Widget @id=7>");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_render_reports_warnings() {
        let (text, warnings) =
            render(&[4, 9, b'T'], CodecConfig::default(), &InspectConfig::compact()).unwrap();
        assert_eq!(text, "true");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_render_error() {
        let err = render(&[4, 8, b'['], CodecConfig::default(), &InspectConfig::compact()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_cli_parses_inspect() {
        let cli = Cli::try_parse_from(["rmarshal", "inspect", "dump.bin", "--input", "hex", "--pretty"])
            .unwrap();
        match cli.command {
            Commands::Inspect { format, pretty, .. } => {
                assert_eq!(format, InputFormat::Hex);
                assert!(pretty);
            }
            _ => panic!("expected inspect"),
        }
    }
}
