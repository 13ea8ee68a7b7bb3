//! `tractstops` - CLI for tract-level traffic stop analysis
//!
//! This binary loads stop and tract CSVs, builds the tract aggregate table,
//! and reports trendlines, summaries and database status.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use regex::RegexBuilder;
use tracing::{info, warn};

use tractstops::cli::{
    render, CacheCommand, Cli, Command, ConfigCommand, DataArgs, DescribeCommand, FitCommand,
    HeadCommand, HoursCommand, JoinCommand, OutputFormat,
};
use tractstops::disparity::Column;
use tractstops::model::{Activity, RaceCategory};
use tractstops::pipeline::{Analysis, Dataset, Inputs};
use tractstops::stats::HourHistogram;
use tractstops::{init_logging, load_stops, Config, Error, Storage};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Join(cmd) => handle_join(&config, &cmd),
        Command::Fit(cmd) => handle_fit(&config, &cmd),
        Command::Describe(cmd) => handle_describe(&config, &cmd),
        Command::Head(cmd) => handle_head(&config, &cmd),
        Command::Hours(cmd) => handle_hours(&config, &cmd),
        Command::Import(cmd) => handle_import(&config, &cmd.data),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Cache(cmd) => handle_cache(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// Run (or fetch from cache) the analysis described by `data`.
fn analyze(config: &Config, data: &DataArgs) -> anyhow::Result<Analysis> {
    let (stops, tracts, options) = data.resolve(config)?;
    let inputs = Inputs::read(&stops, &tracts)?;

    let storage = if config.storage.cache_enabled && !data.no_cache {
        open_cache(config)
    } else {
        None
    };

    let analysis = Analysis::run_cached(&inputs, &options, storage.as_ref())?;
    render::write_exclusions(io::stderr().lock(), &analysis.report)?;
    if analysis.table.is_empty() {
        warn!("The tract table is empty");
    }
    Ok(analysis)
}

fn open_cache(config: &Config) -> Option<Storage> {
    match Storage::open(config.database_path()) {
        Ok(storage) => Some(storage),
        Err(e) => {
            warn!(error = %e, "Table cache unavailable");
            None
        }
    }
}

fn output(path: Option<&PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_join(config: &Config, cmd: &JoinCommand) -> anyhow::Result<()> {
    let analysis = analyze(config, &cmd.data)?;
    let table = &analysis.table;

    let mut out = output(cmd.output.as_ref())?;
    match cmd.format {
        OutputFormat::Csv => table.write_csv(&mut out)?,
        OutputFormat::Json => {
            table.write_json(&mut out)?;
            writeln!(out)?;
        }
        OutputFormat::Table => render::write_rows(&mut out, table.rows(), &render::row_columns())?,
    }
    out.flush()?;

    if let Some(path) = &cmd.output {
        info!(rows = table.len(), path = %path.display(), "Wrote tract table");
    }
    Ok(())
}

fn handle_fit(config: &Config, cmd: &FitCommand) -> anyhow::Result<()> {
    let proportional = config.fit.proportionality_tolerance;
    let band = config.fit.activity_tolerance;

    match cmd {
        FitCommand::Race { data, race, json } => {
            let table = analyze(config, data)?.table;
            let fits = match race {
                Some(r) => vec![(*r, table.race_fit(*r, *r))],
                None => table.race_fits(),
            };
            ensure_fit_errors_only(fits.iter().map(|(_, f)| f))?;

            if *json {
                let values: Vec<_> = fits
                    .iter()
                    .map(|(r, f)| render::fit_json(Column::TractPct(*r), Column::StopsPct(*r), f))
                    .collect();
                print_json(&values)?;
            } else {
                for (race, fit) in &fits {
                    let verdict = fit
                        .as_ref()
                        .ok()
                        .map(|f| f.proportionality(proportional).to_string());
                    println!("{}", render::fit_line(race.label(), fit, verdict));
                }
            }
        }
        FitCommand::Activity {
            data,
            race,
            activity,
            json,
        } => {
            let table = analyze(config, data)?.table;
            let activities = activity.map_or_else(|| Activity::ALL.to_vec(), |a| vec![a]);
            let fits: Vec<_> = activities
                .into_iter()
                .map(|a| (a, table.activity_fit(*race, a)))
                .collect();
            ensure_fit_errors_only(fits.iter().map(|(_, f)| f))?;

            if *json {
                let values: Vec<_> = fits
                    .iter()
                    .map(|(a, f)| {
                        render::fit_json(Column::TractPct(*race), Column::StopsPctActivity(*a), f)
                    })
                    .collect();
                print_json(&values)?;
            } else {
                println!("x = TractPct{}", race.label());
                for (activity, fit) in &fits {
                    let verdict = fit.as_ref().ok().map(|f| f.activity_trend(band).to_string());
                    println!("{}", render::fit_line(activity.label(), fit, verdict));
                }
            }
        }
        FitCommand::Columns { data, x, y, json } => {
            let table = analyze(config, data)?.table;
            let fit = table.fit(*x, *y);
            if *json {
                print_json(&render::fit_json(*x, *y, &fit))?;
            } else {
                println!("{}", render::fit_line(&format!("{y} ~ {x}"), &fit, None));
            }
            fit?;
        }
        FitCommand::Summary { data, json } => {
            let table = analyze(config, data)?.table;
            let mut values = Vec::new();
            for race in RaceCategory::ALL {
                let fit = table.race_fit(race, race);
                if *json {
                    values.push(render::fit_json(
                        Column::TractPct(race),
                        Column::StopsPct(race),
                        &fit,
                    ));
                } else {
                    println!("{}", render::fit_line(&format!("StopsPct{race}"), &fit, None));
                }
                for activity in Activity::ALL {
                    let fit = table.activity_fit(race, activity);
                    if *json {
                        values.push(render::fit_json(
                            Column::TractPct(race),
                            Column::StopsPctActivity(activity),
                            &fit,
                        ));
                    } else {
                        println!(
                            "{}",
                            render::fit_line(&format!("  StopsPct{activity}"), &fit, None)
                        );
                    }
                }
            }
            if *json {
                print_json(&values)?;
            }
        }
    }
    Ok(())
}

/// Fail on anything other than "no fit possible", which is reported inline.
fn ensure_fit_errors_only<'a>(
    fits: impl IntoIterator<Item = &'a tractstops::Result<tractstops::LinearFit>>,
) -> anyhow::Result<()> {
    for fit in fits {
        if let Err(e) = fit {
            if !e.is_fit_unavailable() {
                bail!("fit failed: {e}");
            }
        }
    }
    Ok(())
}

fn handle_describe(config: &Config, cmd: &DescribeCommand) -> anyhow::Result<()> {
    let table = analyze(config, &cmd.data)?.table;

    let mut summaries = table.describe();
    if let Some(pattern) = &cmd.pattern {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid --match pattern: {pattern}"))?;
        summaries.retain(|(column, _)| re.is_match(&column.name()));
        if summaries.is_empty() {
            bail!("no column matches {pattern}");
        }
    }

    if cmd.json {
        let map: serde_json::Map<String, serde_json::Value> = summaries
            .iter()
            .map(|(column, summary)| Ok((column.name(), serde_json::to_value(summary)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        print_json(&map)?;
    } else {
        render::write_describe(io::stdout().lock(), &summaries)?;
    }
    Ok(())
}

fn handle_head(config: &Config, cmd: &HeadCommand) -> anyhow::Result<()> {
    let table = analyze(config, &cmd.data)?.table.truncated(cmd.rows);

    let mut out = io::stdout().lock();
    match cmd.format {
        OutputFormat::Csv => table.write_csv(&mut out)?,
        OutputFormat::Json => {
            table.write_json(&mut out)?;
            writeln!(out)?;
        }
        OutputFormat::Table => render::write_rows(&mut out, table.rows(), &render::row_columns())?,
    }
    Ok(())
}

fn handle_hours(config: &Config, cmd: &HoursCommand) -> anyhow::Result<()> {
    let path = cmd
        .stops
        .clone()
        .or_else(|| config.data.stops_path.clone())
        .ok_or(Error::MissingInput { dataset: "stops" })?;
    let stops = load_stops(&path)?;
    let hours = HourHistogram::of(&stops.records);

    if cmd.json {
        print_json(&serde_json::json!({
            "counts": hours.counts,
            "unknown": hours.unknown,
            "peak": hours.peak(),
        }))?;
    } else {
        render::write_hours(io::stdout().lock(), &hours)?;
    }
    Ok(())
}

fn handle_import(config: &Config, data: &DataArgs) -> anyhow::Result<()> {
    let (stops, tracts, options) = data.resolve(config)?;
    let inputs = Inputs::read(&stops, &tracts)?;
    let digest = inputs.digest(&options);

    let dataset = Dataset::load(&inputs, &options)?;
    let join = dataset.spatial_join();

    let path = config.database_path();
    let mut storage = Storage::open(&path)
        .with_context(|| format!("cannot open database {}", path.display()))?;
    let summary = storage.import(
        &dataset.stops.records,
        &dataset.tracts.tracts,
        &join,
        digest.as_str(),
    )?;

    let stored = storage.stop_counts()?;
    if stored != join.stops_per_tract() {
        bail!("stored stop counts disagree with the spatial join");
    }

    println!(
        "Imported {} stops, {} tracts and {} assignments into {}",
        summary.stops,
        summary.tracts,
        summary.assignments,
        path.display()
    );
    println!("{} tracts received at least one stop", stored.len());
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let path = config.database_path();
    if !path.exists() {
        if json {
            print_json(&serde_json::json!({
                "database_path": path,
                "initialized": false,
            }))?;
        } else {
            println!("Database:      {} (not created yet)", path.display());
        }
        return Ok(());
    }

    let storage = Storage::open(&path)?;
    let stats = storage.stats()?;
    if json {
        print_json(&serde_json::json!({
            "database_path": path,
            "initialized": true,
            "stats": stats,
        }))?;
    } else {
        println!("tractstops status");
        println!("-----------------");
        println!("Database:      {}", path.display());
        println!("Schema:        v{}", stats.schema_version);
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!("Stops:         {}", stats.stops);
        println!("Tracts:        {}", stats.tracts);
        println!("Assignments:   {}", stats.assignments);
        println!("Cached tables: {}", stats.cached_tables);
        match stats.imported_at {
            Some(at) => println!("Imported at:   {}", at.to_rfc3339()),
            None => println!("Imported at:   never"),
        }
    }
    Ok(())
}

fn handle_cache(config: &Config, cmd: &CacheCommand) -> anyhow::Result<()> {
    match cmd {
        CacheCommand::Clear => {
            let path = config.database_path();
            if !path.exists() {
                println!("No cache at {}", path.display());
                return Ok(());
            }
            let removed = Storage::open(&path)?.cache_clear()?;
            println!("Removed {removed} cached tables.");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                print_json(config)?;
            } else {
                let show = |p: &Option<PathBuf>| {
                    p.as_ref()
                        .map_or_else(|| "(not set)".to_string(), |p| p.display().to_string())
                };
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Data]");
                println!("  Stops:              {}", show(&config.data.stops_path));
                println!("  Tracts:             {}", show(&config.data.tracts_path));
                println!(
                    "  County:             {}",
                    config.data.county.as_deref().unwrap_or("(all)")
                );
                println!();
                println!("[Join]");
                println!("  Policy:             {}", config.join.policy);
                println!("  Simplify tolerance: {}", config.join.simplify_tolerance);
                println!();
                println!("[Fit]");
                println!("  Activity band:      {}", config.fit.activity_tolerance);
                println!(
                    "  Proportionality:    {}",
                    config.fit.proportionality_tolerance
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Cache enabled:      {}", config.storage.cache_enabled);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
