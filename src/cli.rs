//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::load_csv;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::line_front_end::LineFrontEnd;
use crate::adapters::svg_plot_adapter::SvgPlotAdapter;
use crate::domain::codegen::{self, GeneratedProcedure};
use crate::domain::error::PineError;
use crate::domain::harness::Harness;
use crate::domain::ohlcv::Dataset;
use crate::domain::runtime::ExecutionResult;
use crate::domain::settings::RunSettings;
use crate::ports::front_end_port::FrontEnd;
use crate::ports::plot_port::NullPlot;

#[derive(Parser, Debug)]
#[command(name = "pinetrader", about = "Pine strategy translator and runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Translate a script into procedure text
    Translate {
        script: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Translate a script and run it over a CSV dataset
    Run {
        script: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write plotted series to this SVG file
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Load procedure text without running it
    Check {
        procedure: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Translate {
            script,
            output,
            config,
        } => run_translate(&script, output.as_deref(), config.as_deref()),
        Command::Run {
            script,
            data,
            config,
            plot,
        } => run_script(&script, &data, config.as_deref(), plot.as_deref()),
        Command::Check { procedure, config } => run_check(&procedure, config.as_deref()),
    }
}

fn fail(err: &PineError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_settings(path: Option<&Path>) -> Result<RunSettings, PineError> {
    match path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            RunSettings::from_config(&FileConfigAdapter::from_file(path)?)
        }
        None => Ok(RunSettings::default()),
    }
}

fn translate_file(script: &Path, settings: &RunSettings) -> Result<GeneratedProcedure, PineError> {
    let source = fs::read_to_string(script)?;
    let unit = LineFrontEnd.parse(&source);
    match unit.kind() {
        Some(kind) => eprintln!("Script kind: {kind}"),
        None => eprintln!("Script kind: undeclared"),
    }
    Ok(codegen::generate_named(&unit, &settings.unit_name))
}

fn run_translate(script: &Path, output: Option<&Path>, config: Option<&Path>) -> ExitCode {
    let result = load_settings(config).and_then(|settings| translate_file(script, &settings));
    let procedure = match result {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let text = procedure.render();
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, &text) {
                return fail(&PineError::Io(e));
            }
            eprintln!(
                "Wrote {} statements to {}",
                procedure.statements.len(),
                path.display()
            );
        }
        None => print!("{text}"),
    }
    ExitCode::SUCCESS
}

fn run_script(script: &Path, data: &Path, config: Option<&Path>, plot: Option<&Path>) -> ExitCode {
    match execute_script(script, data, config, plot) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn execute_script(
    script: &Path,
    data: &Path,
    config: Option<&Path>,
    plot: Option<&Path>,
) -> Result<(), PineError> {
    let settings = load_settings(config)?;

    eprintln!("Translating {}", script.display());
    let procedure = translate_file(script, &settings)?;
    let program = Harness::new(settings.unit_name.as_str()).load_procedure(&procedure)?;

    eprintln!("Loading data from {}", data.display());
    let dataset = load_csv(data)?;
    eprintln!("Running over {} bars...", dataset.len());

    let plot_path = plot
        .map(Path::to_path_buf)
        .or_else(|| settings.plot_output.clone().filter(|_| settings.plot_enabled));

    let result = match plot_path {
        Some(path) => {
            let mut svg = SvgPlotAdapter::new();
            let result = program.run_with(&dataset, settings.execution, &mut svg)?;
            match svg.save(&path) {
                Ok(()) => eprintln!("Wrote {} plots to {}", svg.len(), path.display()),
                Err(e) => tracing::warn!(error = %e, path = %path.display(), "chart not written"),
            }
            result
        }
        None => program.run_with(&dataset, settings.execution, &mut NullPlot)?,
    };

    print_result(&result, &dataset);
    Ok(())
}

fn print_result(result: &ExecutionResult, dataset: &Dataset) {
    println!("bar,date,id,direction,quantity,price");
    for order in &result.orders {
        let date = dataset
            .bars()
            .get(order.bar)
            .map(|b| b.date.to_string())
            .unwrap_or_default();
        let price = order.price.map(|p| p.to_string()).unwrap_or_default();
        println!(
            "{},{},{},{},{},{}",
            order.bar, date, order.id, order.direction, order.quantity, price
        );
    }

    eprintln!("\n{} orders", result.orders.len());
    for (id, size) in &result.positions {
        eprintln!("  position {id}: {size}");
    }
}

fn run_check(procedure_path: &Path, config: Option<&Path>) -> ExitCode {
    let settings = match load_settings(config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    eprintln!("Checking procedure: {}", procedure_path.display());
    let text = match fs::read_to_string(procedure_path) {
        Ok(t) => t,
        Err(e) => return fail(&PineError::Io(e)),
    };

    match Harness::new(settings.unit_name.as_str()).load(&text) {
        Ok(program) => {
            eprintln!(
                "  unit {}: {} setup, {} per-bar, {} deferred steps",
                program.unit_name(),
                program.setup.len(),
                program.per_bar.len(),
                program.deferred.len()
            );
            eprintln!("\nProcedure is valid.");
            ExitCode::SUCCESS
        }
        Err(PineError::Syntax(e)) => {
            eprintln!("  error: {}", e.display_with_context(&text));
            (&PineError::Syntax(e)).into()
        }
        Err(e) => fail(&e),
    }
}
