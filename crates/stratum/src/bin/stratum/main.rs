mod cli;

use stratum::value::ConfigValue;
use stratum::{render, EnvResolver, Origin, RenderOptions, ResolveOptions};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("STRATUM_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Render(render_cli) => render_command(render_cli),
        cli::Command::Get(get_cli) => get(get_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn render_command(cli: cli::RenderCommand) -> anyhow::Result<()> {
    let merged = load(&cli.input)?;
    let resolved = stratum::resolve(&merged, &resolve_options(&cli.input))?;
    output(&cli.output, &resolved)
}

fn get(cli: cli::GetCommand) -> anyhow::Result<()> {
    let merged = load(&cli.input)?;
    let resolved = stratum::resolve(&merged, &resolve_options(&cli.input))?;

    let value = resolved
        .get(&cli.path)?
        .ok_or_else(|| anyhow::anyhow!("no value at path {}", cli.path))?;

    output(&cli.output, value)
}

fn load(input: &cli::InputArgs) -> anyhow::Result<ConfigValue> {
    if input.files.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        return Ok(stratum::parse(
            &stdin,
            &Origin::new_simple("stdin"),
            &stratum::ParseOptions::default(),
        )?);
    }

    // later files override earlier ones
    let mut merged: Option<ConfigValue> = None;
    for file_path in &input.files {
        let tree = stratum::load_file(file_path)?;
        merged = Some(match merged {
            None => tree,
            Some(lower) => tree.with_fallback(&lower),
        });
    }

    merged.ok_or_else(|| anyhow::anyhow!("No files loaded"))
}

fn resolve_options(input: &cli::InputArgs) -> ResolveOptions {
    let mut options = ResolveOptions::default();
    options.allow_unresolved = input.partial;
    if input.env {
        options = options.with_resolver(EnvResolver);
    }
    options
}

fn output(output: &cli::OutputArgs, value: &ConfigValue) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Conf => {
            print!("{}", render(value, &RenderOptions::defaults())?)
        }
        cli::OutputFormat::Json => {
            print!("{}", render(value, &RenderOptions::json())?)
        }
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (stratum-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Tokens => {
            for file_path in &cli.input.files {
                let text = std::fs::read_to_string(file_path)?;
                let origin = Origin::new_file(file_path);
                let tokens = stratum::tokens::tokenize(&text, &origin, stratum::Syntax::Conf)?;
                println!("{tokens:#?}");
            }
        }
        Tree => {
            let merged = load(&cli.input)?;
            println!("{merged:#?}");
        }
    }

    Ok(())
}
