use anyhow::{Context, Result, bail};
use docx_redline_config::Config;
use docx_redline_engine::{
    ApplyReport, DocumentPackage, EngineOptions, RevisionEngine, extract_paragraphs,
    instructions_from_json, render_listing,
};
use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
};

const USAGE: &str = "Usage:
  docx-redline-cli apply <input.docx> <instructions.json> [output.docx] [--author NAME]
  docx-redline-cli extract <input.docx>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Apply {
        input: PathBuf,
        instructions: PathBuf,
        output: Option<PathBuf>,
        author: Option<String>,
    },
    Extract {
        input: PathBuf,
    },
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        bail!("missing command");
    };
    match command.as_str() {
        "apply" => {
            let mut positional = Vec::new();
            let mut author = None;
            let mut rest = rest.iter();
            while let Some(arg) = rest.next() {
                if arg == "--author" {
                    author = Some(rest.next().context("--author needs a value")?.clone());
                } else if let Some(value) = arg.strip_prefix("--author=") {
                    author = Some(value.to_string());
                } else {
                    positional.push(PathBuf::from(arg));
                }
            }
            let mut positional = positional.into_iter();
            match (positional.next(), positional.next(), positional.next(), positional.next()) {
                (Some(input), Some(instructions), output, None) => Ok(Command::Apply {
                    input,
                    instructions,
                    output,
                    author,
                }),
                _ => bail!("apply takes an input document, an instructions file and an optional output path"),
            }
        }
        "extract" => match rest {
            [input] => Ok(Command::Extract {
                input: PathBuf::from(input),
            }),
            _ => bail!("extract takes exactly one input document"),
        },
        other => bail!("unknown command {other:?}"),
    }
}

/// `<dir>/<stem>_revised.docx`, next to the input unless an output
/// directory is configured.
fn default_output(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let dir = output_dir
        .or_else(|| input.parent())
        .map(Path::to_path_buf)
        .unwrap_or_default();
    dir.join(format!("{stem}_revised.docx"))
}

fn engine_options(config: &Config, author: Option<String>) -> EngineOptions {
    EngineOptions {
        author: author.unwrap_or_else(|| config.author.clone()),
        annotate_revisions: config.annotate_revisions,
        demote_conflicts: config.demote_conflicts,
        track_revisions: config.track_revisions,
        category_markers: config.category_markers.clone(),
    }
}

fn run_apply(
    config: &Config,
    input: &Path,
    instructions: &Path,
    output: Option<PathBuf>,
    author: Option<String>,
) -> Result<(PathBuf, ApplyReport)> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let json = fs::read_to_string(instructions)
        .with_context(|| format!("Failed to read {}", instructions.display()))?;
    let instructions = instructions_from_json(&json)
        .with_context(|| format!("Invalid instructions in {}", instructions.display()))?;
    log::info!("Applying {} instructions to {}", instructions.len(), input.display());

    let engine = RevisionEngine::new(engine_options(config, author));
    let revised = engine
        .apply(&bytes, &instructions)
        .with_context(|| format!("Failed to revise {}", input.display()))?;

    let output = output.unwrap_or_else(|| default_output(input, config.output_dir.as_deref()));
    if let Some(parent) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, &revised.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok((output, revised.report))
}

fn run_extract(input: &Path) -> Result<String> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let package = DocumentPackage::open(&bytes)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    Ok(render_listing(&extract_paragraphs(&package)))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Apply {
            input,
            instructions,
            output,
            author,
        } => {
            log::info!("Config path: {}", Config::config_path().display());
            let config = Config::load_or_default().context("Failed to load config file")?;
            let (output, report) = run_apply(&config, &input, &instructions, output, author)?;
            log::info!("Wrote {}", output.display());
            println!("{}", report.to_json()?);
        }
        Command::Extract { input } => print!("{}", run_extract(&input)?),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    if let Err(e) = run(command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[cfg(test)]
#[path = "../../docx-redline-engine/tests/common/mod.rs"]
mod fixtures;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_apply_with_author() {
        let command = parse_args(&args(&["apply", "in.docx", "edits.json", "--author", "Desk"])).unwrap();
        assert_eq!(
            command,
            Command::Apply {
                input: PathBuf::from("in.docx"),
                instructions: PathBuf::from("edits.json"),
                output: None,
                author: Some("Desk".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_apply_with_output() {
        let command = parse_args(&args(&["apply", "in.docx", "edits.json", "out.docx"])).unwrap();
        assert!(matches!(command, Command::Apply { output: Some(_), author: None, .. }));
    }

    #[test]
    fn test_parse_rejects_bad_usage() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["apply", "in.docx"])).is_err());
        assert!(parse_args(&args(&["apply", "a", "b", "c", "d"])).is_err());
        assert!(parse_args(&args(&["apply", "a", "b", "--author"])).is_err());
        assert!(parse_args(&args(&["extract"])).is_err());
        assert!(parse_args(&args(&["publish", "a"])).is_err());
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/docs/report.docx"), None),
            PathBuf::from("/docs/report_revised.docx")
        );
        assert_eq!(
            default_output(Path::new("/docs/report.docx"), Some(Path::new("/out"))),
            PathBuf::from("/out/report_revised.docx")
        );
    }

    #[test]
    fn test_apply_and_extract_files() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("report.docx");
        fs::write(
            &input,
            fixtures::docx(&[fixtures::paragraph_xml("Revenue grew 10% in Q3.")]),
        )
        .unwrap();
        let instructions = temp_dir.path().join("edits.json");
        fs::write(
            &instructions,
            r#"[{"tipo": "SEO", "acao": "substituir", "texto_original": "10%", "texto_novo": "12%", "justificativa": "Updated"}]"#,
        )
        .unwrap();

        let (output, report) =
            run_apply(&Config::default(), &input, &instructions, None, Some("Desk".into())).unwrap();

        assert_eq!(output, temp_dir.path().join("report_revised.docx"));
        assert_eq!(report.applied, 1);
        assert_eq!(run_extract(&output).unwrap(), "[P0|Normal] Revenue grew 12% in Q3.\n");
    }
}
