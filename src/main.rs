use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use pysage::answers::{get_answers, Solution};
use pysage::errors::{classify, set_limit};
use pysage::inspection::{capture_traceback, ErrorDescription};
use pysage::stackoverflow::StackClient;

#[derive(Parser, Debug)]
#[command(
    name = "pysage",
    about = "Friendlier Python errors: Stack Overflow answers adapted to your code",
    version
)]
struct Args {
    /// Python script to diagnose
    file: PathBuf,

    /// Read a saved traceback from this file instead of running the script
    #[arg(short = 'e', long = "error-file")]
    error_file: Option<PathBuf>,

    /// How many search results to pull answers from
    #[arg(short = 'a', long = "n-answers", default_value = "3")]
    n_answers: usize,

    /// Print the query and hint without touching the network
    #[arg(long)]
    dry_run: bool,

    /// Bypass the on-disk response cache
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let traceback = match &args.error_file {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if content.trim().is_empty() {
                bail!("{} contains no traceback", path.display());
            }
            content.trim_end().to_string()
        }
        None => match capture_traceback(&args.file)? {
            Some(traceback) => traceback,
            None => {
                println!(
                    "{} runs without errors. Nothing to diagnose.",
                    args.file.display()
                );
                return Ok(());
            }
        },
    };

    let description = ErrorDescription::from_traceback(&traceback)?;
    let remediation = classify(&description);

    if args.dry_run {
        match &remediation.query {
            Some(query) => println!("query: {}", set_limit(query, args.n_answers)),
            None => println!("query: (none)"),
        }
        match &remediation.hint {
            Some(hint) => println!("hint:\n{hint}"),
            None => println!("hint: (none)"),
        }
        return Ok(());
    }

    println!(
        "{} in {} at line {}",
        description.kind,
        description.file.display(),
        description.line
    );
    println!();

    // A failed fetch leaves the hint channel; only inspection problems and
    // bad arguments are worth a non-zero exit.
    let mut solutions = Vec::new();
    if let Some(query) = &remediation.query {
        match fetch_solutions(query, &description, args.n_answers, !args.no_cache).await {
            Ok(found) => solutions = found,
            Err(err) => eprintln!("Warning: could not fetch answers: {err:#}"),
        }
    }

    if solutions.is_empty() && remediation.hint.is_none() {
        println!("No Stack Overflow answers found and no local hint for this error.");
        println!("Raw message: {}", description.message);
        return Ok(());
    }

    print_solutions(&solutions);

    if let Some(hint) = &remediation.hint {
        if solutions.is_empty() {
            println!("No Stack Overflow answers found; here is a local hint.");
            println!();
        }
        println!("Hint:");
        println!("{hint}");
    }

    Ok(())
}

async fn fetch_solutions(
    query: &str,
    description: &ErrorDescription,
    n_answers: usize,
    use_cache: bool,
) -> Result<Vec<Solution>> {
    let client = StackClient::new(use_cache)?;
    get_answers(&client, query, description, n_answers).await
}

fn print_solutions(solutions: &[Solution]) {
    for (i, solution) in solutions.iter().enumerate() {
        let accepted = if solution.accepted { ", accepted" } else { "" };
        println!(
            "--- Solution {}/{} by {} ({} votes{accepted}) ---",
            i + 1,
            solutions.len(),
            solution.author,
            solution.score
        );
        println!();
        println!("{}", solution.text.trim());
        println!();
    }
}
