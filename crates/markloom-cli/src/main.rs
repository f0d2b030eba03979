use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;

use anyhow::{Context, Result};
use markloom_core::{Document, Options};
use markloom_highlight::{SyntectHighlighter, Theme};

#[derive(Debug, Default)]
struct Flags {
    input: Option<String>,
    options: Options,
    highlight: Option<Theme>,
    sanitized: bool,
    tokens: bool,
}

fn main() {
    init_logging();
    let flags = parse_args();
    if let Err(err) = run(flags) {
        eprintln!("markloom: {:#}", err);
        process::exit(1);
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();
}

fn parse_args() -> Flags {
    let mut flags = Flags::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "--sanitized" => flags.sanitized = true,
            "--tokens" => flags.tokens = true,
            "--highlight" | "--highlight=light" => flags.highlight = Some(Theme::Light),
            "--highlight=dark" => flags.highlight = Some(Theme::Dark),
            "--tab-stop" => {
                match args.next().and_then(|value| value.parse::<usize>().ok()) {
                    Some(width) if width > 0 => flags.options.spaces_per_tab = width,
                    _ => usage_error("--tab-stop expects a positive number"),
                }
            }
            _ if arg.starts_with('-') && arg != "-" => {
                usage_error(&format!("unknown option: {}", arg))
            }
            _ => {
                if flags.input.is_none() {
                    flags.input = Some(arg);
                } else {
                    usage_error(&format!("unexpected argument: {}", arg));
                }
            }
        }
    }
    flags
}

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message);
    print_usage();
    process::exit(2);
}

fn print_usage() {
    eprintln!(
        "Usage: markloom [--tab-stop N] [--highlight[=light|dark]] [--sanitized] [--tokens] [input]"
    );
}

fn run(flags: Flags) -> Result<()> {
    let mut document = Document::with_options(flags.options);
    if let Some(theme) = flags.highlight {
        document = document.with_highlighter(SyntectHighlighter::new(theme));
    }

    match flags.input.as_deref() {
        Some(path) if path != "-" => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
            document
                .read_from(file)
                .with_context(|| format!("failed to read {}", path))?;
        }
        _ => document
            .read_from(io::stdin().lock())
            .context("failed to read stdin")?,
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if flags.tokens {
        document
            .write_tokens(&mut out)
            .context("failed to write token tree")?;
    } else if flags.sanitized {
        out.write_all(document.to_html_sanitized().as_bytes())
            .context("failed to write output")?;
    } else {
        document.write(&mut out).context("failed to write output")?;
    }
    out.flush().context("failed to write output")?;
    log::debug!("done, {} link references", document.links().len());
    Ok(())
}
