//! celgen CLI
//!
//! ```text
//! celgen [--gomod go.mod] [--output output.json] [--config celgen.yaml] <source>
//! ```
//!
//! `<source>` is either a directory of conformance JSON test files or a
//! path inside the cel-go module (`parser/parser_test.go`,
//! `ext/comprehensions_test.go`). Output ending in `.ts` is written as a
//! TypeScript module, anything else as JSON.

use celgen::*;
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE_ERROR: &str = "must provide path to a cel-go source file or testdata JSON directory";

#[derive(Debug, PartialEq)]
struct Args {
    go_mod: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    pretty: bool,
    parallel: bool,
    source: PathBuf,
}

enum Command {
    Run(Args),
    Help,
    Version,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match parse_args(&args) {
        Ok(Command::Run(args)) => run(&args),
        Ok(Command::Help) => {
            print_usage();
            Ok(())
        }
        Ok(Command::Version) => {
            println!("celgen {}", VERSION);
            Ok(())
        }
        Err(e) => {
            print_usage();
            Err(e)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::load(path)?,
        None => GeneratorConfig::default(),
    };
    config.pretty |= args.pretty;
    config.parallel |= args.parallel;

    let envs = Environments::new(&config)?;
    let assembled = Assembler::new(&envs, config.parallel).assemble(&args.source, &args.go_mod)?;
    write_output(&args.output, &assembled, config.pretty)
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut go_mod = PathBuf::from("go.mod");
    let mut output = PathBuf::from("output.json");
    let mut config = None;
    let mut pretty = false;
    let mut parallel = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        // Go-style single-dash flags are accepted too
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if arg.starts_with('-') => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            inline
                .clone()
                .or_else(|| iter.next().cloned())
                .ok_or_else(|| Error::Other(format!("flag needs an argument: {}", name)))
        };
        match flag.trim_start_matches('-') {
            _ if !flag.starts_with('-') || flag == "-" => positional.push(arg.clone()),
            "gomod" => go_mod = PathBuf::from(value(flag)?),
            "output" | "o" => output = PathBuf::from(value(flag)?),
            "config" | "c" => config = Some(PathBuf::from(value(flag)?)),
            "pretty" => pretty = true,
            "parallel" => parallel = true,
            "help" | "h" => return Ok(Command::Help),
            "version" | "V" => return Ok(Command::Version),
            _ => return Err(Error::Other(format!("flag provided but not defined: {}", flag))),
        }
    }

    if positional.len() != 1 {
        return Err(USAGE_ERROR.into());
    }
    Ok(Command::Run(Args {
        go_mod,
        output,
        config,
        pretty,
        parallel,
        source: PathBuf::from(positional.remove(0)),
    }))
}

fn print_usage() {
    eprintln!(
        r#"
celgen - incremental CEL test-suite generator

USAGE:
    celgen [OPTIONS] <SOURCE>

SOURCE:
    directory                      Conformance SimpleTestFile JSON documents
    parser/parser_test.go          cel-go parser tests (suite "parsing")
    ext/comprehensions_test.go     cel-go comprehension tests (suite "comprehension")

OPTIONS:
    --gomod <file>      go.mod pinning github.com/google/cel-go [default: go.mod]
    --output <file>     Output path, .ts for a TypeScript module [default: output.json]
    --config <file>     YAML generator configuration
    --pretty            Indent JSON output
    --parallel          Compile tests on all cores
    -h, --help          Print help
    -V, --version       Print version

ENVIRONMENT:
    RUST_LOG            Log filter [default: info]
    GOMODCACHE, GOPATH  Go module cache location
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Result<Command> {
        parse_args(&list.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    fn run_args(list: &[&str]) -> Args {
        match args(list) {
            Ok(Command::Run(args)) => args,
            _ => panic!("expected run for {:?}", list),
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            run_args(&["parser/parser_test.go"]),
            Args {
                go_mod: PathBuf::from("go.mod"),
                output: PathBuf::from("output.json"),
                config: None,
                pretty: false,
                parallel: false,
                source: PathBuf::from("parser/parser_test.go"),
            }
        );
    }

    #[test]
    fn test_flag_forms() {
        let parsed = run_args(&[
            "-gomod",
            "../go.mod",
            "--output=out.ts",
            "testdata",
            "--config",
            "celgen.yaml",
            "--parallel",
        ]);
        assert_eq!(parsed.go_mod, PathBuf::from("../go.mod"));
        assert_eq!(parsed.output, PathBuf::from("out.ts"));
        assert_eq!(parsed.config, Some(PathBuf::from("celgen.yaml")));
        assert_eq!(parsed.source, PathBuf::from("testdata"));
        assert!(parsed.parallel);
        assert!(!parsed.pretty);
    }

    #[test]
    fn test_positional_count() {
        for list in [&[][..], &["a", "b"][..]] {
            let err = args(list).err().unwrap();
            assert_eq!(err.to_string(), USAGE_ERROR);
        }
    }

    #[test]
    fn test_bad_flags() {
        assert!(args(&["--bogus", "x"]).is_err());
        let err = args(&["x", "--output"]).err().unwrap();
        assert!(err.to_string().contains("flag needs an argument"));
        assert!(matches!(args(&["--help"]), Ok(Command::Help)));
    }
}
