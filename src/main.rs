mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Get version string with dev suffix for non-release builds
fn get_version() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let is_release = env!("IS_RELEASE");
    let git_hash = env!("GIT_HASH");

    if is_release == "true" {
        version.to_string()
    } else {
        format!("{}-dev (git: {})", version, git_hash)
    }
}

#[derive(Parser)]
#[command(name = "neuroforge")]
#[command(about = "Declarative container recipe compiler", long_about = None)]
struct Cli {
    /// Print version
    #[arg(short = 'V', long = "version")]
    version: bool,

    /// Path to builder.config.yaml (default: ./builder.config.yaml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a recipe's Dockerfile to stdout
    Generate {
        /// Path to the recipe's build.yaml
        recipe: std::path::PathBuf,
    },

    /// Stage files and write local/build/<name>/Dockerfile
    Build {
        /// Path to the recipe's build.yaml
        recipe: std::path::PathBuf,
        /// `KEY=DIR` local bindings, repeatable
        #[arg(long = "local", value_parser = parse_local_binding)]
        local: Vec<(String, String)>,
    },

    /// Validate and render every recipe under the configured roots
    #[command(name = "test-all")]
    TestAll,

    /// Drive template-level fixtures
    #[command(name = "template-tests")]
    TemplateTests {
        /// Pack names to restrict to; all packs if empty
        selector: Vec<String>,
        /// Print the rendered Dockerfile for each fixture
        #[arg(long = "print-dockerfile")]
        print_dockerfile: bool,
    },
}

fn parse_local_binding(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected KEY=DIR, got {s:?}")),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.version {
        println!("neuroforge {}", get_version());
        return;
    }

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        std::process::exit(0);
    };

    let config_path = cli.config.unwrap_or_else(|| std::path::PathBuf::from("builder.config.yaml"));
    let result = match command {
        Commands::Generate { recipe } => commands::generate::run(&recipe, &config_path),
        Commands::Build { recipe, local } => commands::build::run(&recipe, &config_path, local),
        Commands::TestAll => commands::test_all::run(&config_path),
        Commands::TemplateTests { selector, print_dockerfile } => {
            commands::template_tests::run(&selector, print_dockerfile)
        }
    };

    if let Err(err) = result {
        print_error(&err);
        std::process::exit(1);
    }
}

/// Renders the top-level error (§7: "diagnostic to stderr ... with the
/// originating file/field path where available"). When the failure
/// traces back to a `RecipeError` we hand it to `miette` for a
/// source-annotated report (`miette::Diagnostic`'s `code`/`help`); any
/// other failure (I/O, missing `docker`, ...) falls back to the
/// teacher's plain colored-prefix style.
fn print_error(err: &anyhow::Error) {
    use colored::Colorize;
    if let Some(recipe_err) = err.downcast_ref::<neuroforge::RecipeError>() {
        let report: miette::Report = miette::Report::new(clone_for_report(recipe_err));
        eprintln!("{report:?}");
        return;
    }
    eprintln!("{} {err:?}", "error:".red().bold());
}

/// `RecipeError` doesn't implement `Clone` (its `std::io::Error`/`serde`
/// passthrough variants don't), so rebuild an equivalent value to hand
/// to `miette::Report::new` rather than fighting the borrow through
/// `anyhow::Error`. The taxonomy-carrying variants (§7) round-trip
/// exactly, including their `miette` code; the I/O/YAML/JSON
/// passthroughs collapse to their rendered message under the closest
/// matching code.
fn clone_for_report(err: &neuroforge::RecipeError) -> neuroforge::RecipeError {
    use neuroforge::RecipeError as E;
    match err {
        E::Schema { path, message } => E::schema(path.clone(), message.clone()),
        E::TemplateSyntax { message } => E::template_syntax(message.clone()),
        E::Evaluation { message } => E::evaluation(message.clone()),
        E::Directive { message } => E::directive(message.clone()),
        E::Cache { message } => E::cache(message.clone()),
        E::Lowering { message } => E::lowering(message.clone()),
        E::Io(_) | E::Yaml(_) | E::Json(_) => E::directive(err.to_string()),
    }
}
